use serde::{Deserialize, Serialize};

/// One chat between a user and the bot, as issued by the server.
///
/// The id is opaque and `created_at` is kept verbatim as the server sent it;
/// the backend emits naive ISO-style stamps that must round-trip untouched.
/// A conversation is never mutated after creation; its list preview is a
/// read-side projection derived from the message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(rename = "convo_id")]
    pub id: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}
