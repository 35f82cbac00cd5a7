use async_trait::async_trait;

use super::types::{AudioClip, ChatReply, GatewayError};
use crate::models::{Conversation, Message};

/// Boundary to the remote chat service.
///
/// Every operation is request/response, fallible and network-latent; no
/// ordering is guaranteed between concurrent calls beyond what each
/// response itself satisfies. Implementations must not mutate any session
/// state; reconciliation is the store's job.
#[async_trait]
pub trait SyncGateway: Send + Sync {
    async fn list_conversations(&self, user: &str) -> Result<Vec<Conversation>, GatewayError>;

    async fn create_conversation(&self, user: &str) -> Result<Conversation, GatewayError>;

    /// Full ordered history for one conversation, already normalized.
    async fn get_history(&self, conversation_id: &str) -> Result<Vec<Message>, GatewayError>;

    async fn send_text(
        &self,
        conversation_id: &str,
        user: &str,
        body: &str,
    ) -> Result<ChatReply, GatewayError>;

    async fn send_audio(
        &self,
        conversation_id: &str,
        user: &str,
        clip: AudioClip,
    ) -> Result<ChatReply, GatewayError>;
}
