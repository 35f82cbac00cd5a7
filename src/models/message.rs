use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::payload::TravelPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Role {
    User,
    Bot,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Bot => "bot",
        }
    }
}

// Historical logs contain only "user" and "bot"; anything else is treated
// as user input rather than rejecting the whole record.
impl From<String> for Role {
    fn from(s: String) -> Self {
        match s.as_str() {
            "bot" => Role::Bot,
            _ => Role::User,
        }
    }
}

/// One entry in a conversation's log. Append-only; ordering is insertion
/// order and is never re-sorted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    #[serde(
        rename = "structured_data",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub payload: Option<TravelPayload>,
    pub ts: f64,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            payload: None,
            ts: now_ts(),
        }
    }

    pub fn bot(text: impl Into<String>, payload: Option<TravelPayload>) -> Self {
        Self {
            role: Role::Bot,
            text: text.into(),
            payload,
            ts: now_ts(),
        }
    }
}

/// Current wall-clock time as fractional seconds since the epoch, matching
/// the timestamps the server persists.
pub fn now_ts() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}
