use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Fixed key the display name is stored under.
pub const USER_NAME_KEY: &str = "chat_user_name";

const PROFILE_DIR: &str = "viamigo";
const PROFILE_FILE: &str = "profile.json";

/// Small key/value profile persisted across sessions as a JSON file in the
/// platform config directory.
pub struct Profile {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl Profile {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(PROFILE_DIR).join(PROFILE_FILE))
    }

    /// Load the profile, starting empty when the file is missing. A
    /// corrupt file is logged and treated as empty rather than fatal.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(values) => values,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "corrupt profile, starting fresh: {e}");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn user_name(&self) -> Option<&str> {
        self.values.get(USER_NAME_KEY).map(String::as_str)
    }

    pub fn set_user_name(&mut self, name: impl Into<String>) {
        self.values.insert(USER_NAME_KEY.to_string(), name.into());
    }

    /// Return the stored display name, asking `prompt` once to establish
    /// it when absent. A declined prompt stores nothing.
    pub fn ensure_user_name(
        &mut self,
        prompt: impl FnOnce() -> Option<String>,
    ) -> Result<Option<String>> {
        if let Some(name) = self.user_name() {
            return Ok(Some(name.to_string()));
        }
        match prompt() {
            Some(name) if !name.trim().is_empty() => {
                let name = name.trim().to_string();
                self.set_user_name(name.clone());
                self.save()?;
                Ok(Some(name))
            }
            _ => Ok(None),
        }
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(&self.values)?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("writing {}", self.path.display()))
    }
}
