use serde::Deserialize;
use thiserror::Error;

use crate::models::{Message, Role, TravelPayload};
use crate::services::normalize;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request failed: HTTP {status}")]
    RequestFailed { status: u16 },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Audio artifact produced by one finished capture session, handed to the
/// gateway by value.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub file_name: String,
}

/// A chat response from the server, text and audio endpoints alike.
///
/// Older deployments answer with `reply`, newer ones with `reply_text`;
/// both are accepted and the non-empty one wins. `transcription` is only
/// present on the audio endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    reply: Option<String>,
    #[serde(default)]
    reply_text: Option<String>,
    #[serde(default)]
    pub structured_data: Option<TravelPayload>,
    #[serde(default)]
    pub agents_called: Vec<String>,
    #[serde(default)]
    transcription: Option<String>,
}

impl ChatReply {
    #[cfg(test)]
    pub fn with_reply(text: &str) -> Self {
        Self {
            reply_text: Some(text.to_string()),
            ..Self::default()
        }
    }

    #[cfg(test)]
    pub fn with_transcription(transcription: &str, reply: &str) -> Self {
        Self {
            transcription: Some(transcription.to_string()),
            reply: Some(reply.to_string()),
            ..Self::default()
        }
    }

    /// The displayable reply body, repaired and never null.
    pub fn reply_text(&self) -> String {
        normalize::clean_text(&normalize::first_non_empty(
            self.reply_text.as_deref(),
            self.reply.as_deref(),
        ))
    }

    /// Repaired transcription of the sent audio, empty for text sends.
    pub fn transcription_text(&self) -> String {
        normalize::clean_text(self.transcription.as_deref().unwrap_or_default())
    }

    /// Convert into the bot message the session log stores, scrubbing
    /// every payload text field on the way.
    pub fn into_bot_message(self) -> Message {
        let text = self.reply_text();
        let payload = self.structured_data.map(|mut p| {
            normalize::scrub_payload(&mut p);
            p
        });
        Message::bot(text, payload)
    }
}

/// One message record as persisted by the server. Some historical records
/// carry `text`, others `content`; timestamps may be missing entirely.
#[derive(Debug, Deserialize)]
pub struct RawMessage {
    pub role: Role,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    pub structured_data: Option<TravelPayload>,
    #[serde(default)]
    pub ts: f64,
}

impl RawMessage {
    pub fn into_message(self) -> Message {
        let text = normalize::clean_text(&normalize::first_non_empty(
            self.text.as_deref(),
            self.content.as_deref(),
        ));
        let payload = self.structured_data.map(|mut p| {
            normalize::scrub_payload(&mut p);
            p
        });
        Message {
            role: self.role,
            text,
            payload,
            ts: self.ts,
        }
    }
}

/// Wire shape of `GET /convo/{id}`.
#[derive(Debug, Deserialize)]
pub struct RawConversation {
    #[serde(default)]
    pub messages: Vec<RawMessage>,
}
