use url::Url;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// Environment variable overriding the chat service base URL.
pub const API_URL_ENV: &str = "VIAMIGO_API_URL";

/// Process-wide gateway configuration, loaded explicitly once at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: Url,
}

impl GatewayConfig {
    /// Read the base URL from the environment, falling back to the default
    /// when unset or unparsable (an unparsable override is logged and
    /// ignored rather than treated as fatal).
    pub fn from_env() -> Self {
        match std::env::var(API_URL_ENV) {
            Ok(raw) => match Url::parse(&raw) {
                Ok(base_url) => Self { base_url },
                Err(e) => {
                    tracing::warn!("ignoring invalid {API_URL_ENV}={raw}: {e}");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let base_url = Url::parse(DEFAULT_API_URL).unwrap_or_else(|_| {
            // The constant is a valid URL; parsing it cannot fail.
            unreachable!("default API URL must parse")
        });
        Self { base_url }
    }
}
