use async_trait::async_trait;
use reqwest::multipart;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use url::Url;

use super::traits::SyncGateway;
use super::types::{AudioClip, ChatReply, GatewayError, RawConversation};
use crate::config::GatewayConfig;
use crate::models::{Conversation, Message};

/// `SyncGateway` over the service's HTTP API: form posts in, JSON out.
pub struct HttpGateway {
    client: Client,
    base_url: Url,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.base_url
            .join(path)
            .map_err(|e| GatewayError::Network(format!("bad endpoint {path}: {e}")))
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::RequestFailed {
                status: status.as_u16(),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }
}

fn transport(e: reqwest::Error) -> GatewayError {
    GatewayError::Network(e.to_string())
}

#[async_trait]
impl SyncGateway for HttpGateway {
    async fn list_conversations(&self, user: &str) -> Result<Vec<Conversation>, GatewayError> {
        let response = self
            .client
            .get(self.endpoint("convos")?)
            .query(&[("user", user)])
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }

    async fn create_conversation(&self, user: &str) -> Result<Conversation, GatewayError> {
        let response = self
            .client
            .post(self.endpoint("new_convo")?)
            .form(&[("user", user)])
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }

    async fn get_history(&self, conversation_id: &str) -> Result<Vec<Message>, GatewayError> {
        let response = self
            .client
            .get(self.endpoint(&format!("convo/{conversation_id}"))?)
            .send()
            .await
            .map_err(transport)?;
        let raw: RawConversation = Self::decode(response).await?;
        Ok(raw
            .messages
            .into_iter()
            .map(|m| m.into_message())
            .collect())
    }

    async fn send_text(
        &self,
        conversation_id: &str,
        user: &str,
        body: &str,
    ) -> Result<ChatReply, GatewayError> {
        let response = self
            .client
            .post(self.endpoint("chat/")?)
            .form(&[
                ("message", body),
                ("convo_id", conversation_id),
                ("user", user),
            ])
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }

    async fn send_audio(
        &self,
        conversation_id: &str,
        user: &str,
        clip: AudioClip,
    ) -> Result<ChatReply, GatewayError> {
        let part = multipart::Part::bytes(clip.bytes)
            .file_name(clip.file_name)
            .mime_str(clip.content_type)
            .map_err(transport)?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("convo_id", conversation_id.to_string())
            .text("user", user.to_string());

        let response = self
            .client
            .post(self.endpoint("chat/audio")?)
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        Self::decode(response).await
    }
}
