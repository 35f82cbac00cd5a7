//! The per-user chat session: conversation list, message logs, optimistic
//! sends and reconciliation with the remote service.
//!
//! All mutation goes through the store; presentation layers only read the
//! projections it exposes. Gateway calls are bound to the conversation id
//! captured when the call was issued, so a response that arrives after the
//! user switched conversations lands in the log it was sent from, or is
//! discarded if that log is gone, instead of leaking into the active one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use crate::gateway::types::{AudioClip, GatewayError};
use crate::gateway::SyncGateway;
use crate::models::{Conversation, Message, Role};

/// Transient user entry shown while a voice clip is being transcribed.
/// Replaced by exact-text match, so it must never collide with real input.
pub const AUDIO_PLACEHOLDER: &str = "(processing audio…)";

/// Character budget for a conversation list preview.
pub const PREVIEW_BUDGET: usize = 100;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no user identified")]
    NoUser,

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Default)]
struct SessionState {
    user: Option<String>,
    conversations: Vec<Conversation>,
    active: Option<String>,
    // One log per conversation seen this session, never evicted: a reply
    // completing after a conversation switch always finds the log its
    // send was issued against.
    logs: HashMap<String, Vec<Message>>,
    composing: bool,
    notices: Vec<String>,
}

/// Owns every message log and the active-conversation pointer.
pub struct SessionStore {
    gateway: Arc<dyn SyncGateway>,
    state: Mutex<SessionState>,
}

impl SessionStore {
    pub fn new(gateway: Arc<dyn SyncGateway>) -> Self {
        Self {
            gateway,
            state: Mutex::new(SessionState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        // The lock is only held between suspension points, never across
        // them, so poisoning can only come from a panicking reader.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_user(&self, name: impl Into<String>) {
        self.state().user = Some(name.into());
    }

    pub fn user(&self) -> Option<String> {
        self.state().user.clone()
    }

    /// Load the user's conversations and activate one, creating the first
    /// conversation automatically for a brand-new user. A failing list
    /// call degrades to an empty store rather than failing bootstrap.
    pub async fn bootstrap(&self) -> Result<(), SessionError> {
        let user = self.state().user.clone().ok_or(SessionError::NoUser)?;
        match self.gateway.list_conversations(&user).await {
            Ok(conversations) if conversations.is_empty() => {
                self.create_conversation().await?;
                Ok(())
            }
            Ok(conversations) => {
                let first = conversations[0].id.clone();
                self.state().conversations = conversations;
                self.select_conversation(&first).await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("could not load conversations: {e}");
                self.push_notice("Could not load your conversations");
                Ok(())
            }
        }
    }

    /// Switch the active conversation, replacing the visible log wholesale
    /// with the fetched history. Fails silently into an empty log.
    pub async fn select_conversation(&self, id: &str) {
        match self.gateway.get_history(id).await {
            Ok(messages) => {
                let mut state = self.state();
                state.logs.insert(id.to_string(), messages);
                state.active = Some(id.to_string());
            }
            Err(e) => {
                tracing::warn!(conversation = %id, "could not load history: {e}");
                let mut state = self.state();
                state.logs.insert(id.to_string(), Vec::new());
                state.active = Some(id.to_string());
                state.notices.push("Could not load this conversation".into());
            }
        }
    }

    /// Create a conversation, prepend it to the list and make it active.
    pub async fn create_conversation(&self) -> Result<String, SessionError> {
        let user = self.state().user.clone().ok_or(SessionError::NoUser)?;
        let conversation = self.gateway.create_conversation(&user).await?;
        let id = conversation.id.clone();
        let mut state = self.state();
        state.logs.insert(id.clone(), Vec::new());
        state.conversations.insert(0, conversation);
        state.active = Some(id.clone());
        Ok(id)
    }

    /// Send a text message: optimistic user append, then the gateway call,
    /// then exactly one bot append into the log it was issued against.
    /// A blank body, or a store with no user or active conversation, is a
    /// silent no-op. On failure the optimistic message stays.
    pub async fn send_text(&self, body: &str) -> Result<(), SessionError> {
        let body = body.trim();
        let Some((conversation_id, user)) = self.begin_send(body, Message::user(body)) else {
            return Ok(());
        };

        match self.gateway.send_text(&conversation_id, &user, body).await {
            Ok(reply) => {
                let bot = reply.into_bot_message();
                let mut state = self.state();
                state.composing = false;
                state.logs.entry(conversation_id).or_default().push(bot);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(conversation = %conversation_id, "send failed: {e}");
                let mut state = self.state();
                state.composing = false;
                state.notices.push("Message could not be sent".into());
                Err(e.into())
            }
        }
    }

    /// Send a finished voice clip. A placeholder user message stands in
    /// while the clip is transcribed; the response replaces it, by exact
    /// text match, with the transcription and the bot reply. On failure
    /// the placeholder is removed, never duplicated.
    pub async fn send_audio(&self, clip: AudioClip) -> Result<(), SessionError> {
        let Some((conversation_id, user)) =
            self.begin_send(AUDIO_PLACEHOLDER, Message::user(AUDIO_PLACEHOLDER))
        else {
            return Ok(());
        };

        match self.gateway.send_audio(&conversation_id, &user, clip).await {
            Ok(reply) => {
                let transcription = reply.transcription_text();
                let bot = reply.into_bot_message();
                let mut state = self.state();
                state.composing = false;
                let log = state.logs.entry(conversation_id).or_default();
                log.retain(|m| m.text != AUDIO_PLACEHOLDER);
                log.push(Message::user(transcription));
                log.push(bot);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(conversation = %conversation_id, "audio send failed: {e}");
                let mut state = self.state();
                state.composing = false;
                if let Some(log) = state.logs.get_mut(&conversation_id) {
                    log.retain(|m| m.text != AUDIO_PLACEHOLDER);
                }
                state.notices.push("Voice message could not be sent".into());
                Err(e.into())
            }
        }
    }

    /// Guard + optimistic append shared by both send paths. Returns the
    /// conversation id the send is bound to, captured before any await.
    fn begin_send(&self, body: &str, optimistic: Message) -> Option<(String, String)> {
        if body.is_empty() {
            return None;
        }
        let mut state = self.state();
        let (Some(conversation_id), Some(user)) = (state.active.clone(), state.user.clone())
        else {
            tracing::debug!("ignoring send without user or active conversation");
            return None;
        };
        state
            .logs
            .entry(conversation_id.clone())
            .or_default()
            .push(optimistic);
        state.composing = true;
        Some((conversation_id, user))
    }

    // --- read-side projections ---

    pub fn conversations(&self) -> Vec<Conversation> {
        self.state().conversations.clone()
    }

    pub fn active_conversation(&self) -> Option<String> {
        self.state().active.clone()
    }

    /// The active conversation's log; empty when nothing is active.
    pub fn messages(&self) -> Vec<Message> {
        let state = self.state();
        state
            .active
            .as_ref()
            .and_then(|id| state.logs.get(id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_composing(&self) -> bool {
        self.state().composing
    }

    /// Drain pending user-facing notices (send failures and the like).
    pub fn take_notices(&self) -> Vec<String> {
        std::mem::take(&mut self.state().notices)
    }

    fn push_notice(&self, notice: &str) {
        self.state().notices.push(notice.to_string());
    }

    /// List-item preview: the first couple of real messages, role-tagged
    /// and clipped to a fixed budget. Derived on read, never persisted.
    pub fn conversation_preview(&self, id: &str) -> Option<String> {
        let state = self.state();
        let log = state.logs.get(id)?;
        let parts: Vec<String> = log
            .iter()
            .filter(|m| !m.text.trim().is_empty())
            .take(2)
            .map(|m| {
                let marker = match m.role {
                    Role::User => "You:",
                    Role::Bot => "Bot:",
                };
                format!("{marker} {}", m.text.trim())
            })
            .collect();
        if parts.is_empty() {
            return None;
        }
        Some(truncate_preview(&parts.join(" ")))
    }
}

fn truncate_preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_BUDGET {
        return text.to_string();
    }
    let clipped: String = text.chars().take(PREVIEW_BUDGET).collect();
    format!("{clipped}…")
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::oneshot;

    use super::*;
    use crate::gateway::types::ChatReply;
    use crate::services::capture::{CaptureController, CaptureError, CaptureSink, MicBackend};

    /// Scripted gateway: each send pops the next reply, which either
    /// resolves immediately or waits on a oneshot so tests can control
    /// completion order.
    enum Scripted {
        Ready(Result<ChatReply, GatewayError>),
        Gated(oneshot::Receiver<Result<ChatReply, GatewayError>>),
    }

    #[derive(Default)]
    struct MockGateway {
        conversations: Vec<Conversation>,
        histories: Mutex<HashMap<String, Vec<Message>>>,
        text_replies: Mutex<VecDeque<Scripted>>,
        audio_replies: Mutex<VecDeque<Scripted>>,
        created: AtomicUsize,
    }

    impl MockGateway {
        fn queue_text(&self, scripted: Scripted) {
            self.text_replies.lock().unwrap().push_back(scripted);
        }

        fn queue_audio(&self, scripted: Scripted) {
            self.audio_replies.lock().unwrap().push_back(scripted);
        }
    }

    async fn resolve(scripted: Scripted) -> Result<ChatReply, GatewayError> {
        match scripted {
            Scripted::Ready(reply) => reply,
            Scripted::Gated(rx) => rx
                .await
                .unwrap_or_else(|_| Err(GatewayError::Network("gate dropped".into()))),
        }
    }

    #[async_trait]
    impl SyncGateway for MockGateway {
        async fn list_conversations(&self, _user: &str) -> Result<Vec<Conversation>, GatewayError> {
            Ok(self.conversations.clone())
        }

        async fn create_conversation(&self, _user: &str) -> Result<Conversation, GatewayError> {
            let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Conversation {
                id: format!("new-{n}"),
                created_at: "2024-01-01T00:00:00".into(),
                title: None,
            })
        }

        async fn get_history(&self, conversation_id: &str) -> Result<Vec<Message>, GatewayError> {
            self.histories
                .lock()
                .unwrap()
                .get(conversation_id)
                .cloned()
                .ok_or(GatewayError::RequestFailed { status: 404 })
        }

        async fn send_text(
            &self,
            _conversation_id: &str,
            _user: &str,
            _body: &str,
        ) -> Result<ChatReply, GatewayError> {
            let scripted = self
                .text_replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected send_text");
            resolve(scripted).await
        }

        async fn send_audio(
            &self,
            _conversation_id: &str,
            _user: &str,
            _clip: AudioClip,
        ) -> Result<ChatReply, GatewayError> {
            let scripted = self
                .audio_replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected send_audio");
            resolve(scripted).await
        }
    }

    fn convo(id: &str) -> Conversation {
        Conversation {
            id: id.to_string(),
            created_at: "2024-01-01T00:00:00".into(),
            title: None,
        }
    }

    // Repeated init is fine: only the first call installs the subscriber.
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn store_with(gateway: MockGateway) -> (Arc<SessionStore>, Arc<MockGateway>) {
        init_tracing();
        let gateway = Arc::new(gateway);
        let as_gateway: Arc<dyn SyncGateway> = gateway.clone();
        let store = Arc::new(SessionStore::new(as_gateway));
        store.set_user("ana");
        (store, gateway)
    }

    fn texts(messages: &[Message]) -> Vec<(&Role, &str)> {
        messages
            .iter()
            .map(|m| (&m.role, m.text.as_str()))
            .collect()
    }

    #[tokio::test]
    async fn test_bootstrap_creates_first_conversation() {
        let (store, gateway) = store_with(MockGateway::default());
        store.bootstrap().await.unwrap();

        assert_eq!(gateway.created.load(Ordering::SeqCst), 1);
        assert_eq!(store.conversations().len(), 1);
        assert_eq!(store.active_conversation().as_deref(), Some("new-1"));
        assert!(store.messages().is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_activates_first_existing_conversation() {
        let gateway = MockGateway {
            conversations: vec![convo("c1"), convo("c2")],
            ..MockGateway::default()
        };
        gateway
            .histories
            .lock()
            .unwrap()
            .insert("c1".into(), vec![Message::user("hola")]);
        let (store, gateway) = store_with(gateway);
        store.bootstrap().await.unwrap();

        assert_eq!(gateway.created.load(Ordering::SeqCst), 0);
        assert_eq!(store.active_conversation().as_deref(), Some("c1"));
        assert_eq!(store.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_send_text_appends_user_then_bot() {
        let (store, gateway) = store_with(MockGateway::default());
        store.bootstrap().await.unwrap();
        gateway.queue_text(Scripted::Ready(Ok(ChatReply::with_reply("Hi there"))));

        store.send_text("Hello").await.unwrap();

        let log = store.messages();
        assert_eq!(
            texts(&log),
            vec![(&Role::User, "Hello"), (&Role::Bot, "Hi there")]
        );
        assert!(!store.is_composing());
    }

    #[tokio::test]
    async fn test_send_text_noop_without_body_or_conversation() {
        let (store, _) = store_with(MockGateway::default());
        // No active conversation yet.
        store.send_text("Hello").await.unwrap();
        store.bootstrap().await.unwrap();
        store.send_text("   ").await.unwrap();
        assert!(store.messages().is_empty());
        assert!(!store.is_composing());
    }

    #[tokio::test]
    async fn test_send_failure_keeps_optimistic_message() {
        let (store, gateway) = store_with(MockGateway::default());
        store.bootstrap().await.unwrap();
        gateway.queue_text(Scripted::Ready(Err(GatewayError::Network(
            "unreachable".into(),
        ))));

        assert!(store.send_text("Hello").await.is_err());
        assert_eq!(texts(&store.messages()), vec![(&Role::User, "Hello")]);
        assert!(!store.is_composing());
        assert_eq!(store.take_notices().len(), 1);
    }

    #[tokio::test]
    async fn test_out_of_order_completion_loses_nothing() {
        let (store, gateway) = store_with(MockGateway::default());
        store.bootstrap().await.unwrap();

        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();
        gateway.queue_text(Scripted::Gated(rx_a));
        gateway.queue_text(Scripted::Gated(rx_b));

        let store_a = store.clone();
        let task_a = tokio::spawn(async move { store_a.send_text("first").await });
        tokio::task::yield_now().await;
        let store_b = store.clone();
        let task_b = tokio::spawn(async move { store_b.send_text("second").await });
        tokio::task::yield_now().await;

        // B's reply lands before A's.
        tx_b.send(Ok(ChatReply::with_reply("reply-b"))).unwrap();
        tokio::task::yield_now().await;
        tx_a.send(Ok(ChatReply::with_reply("reply-a"))).unwrap();
        task_a.await.unwrap().unwrap();
        task_b.await.unwrap().unwrap();

        assert_eq!(
            texts(&store.messages()),
            vec![
                (&Role::User, "first"),
                (&Role::User, "second"),
                (&Role::Bot, "reply-b"),
                (&Role::Bot, "reply-a"),
            ]
        );
    }

    #[tokio::test]
    async fn test_stale_reply_lands_in_issuing_conversation() {
        let gateway = MockGateway {
            conversations: vec![convo("x"), convo("y")],
            ..MockGateway::default()
        };
        let (store, gateway) = store_with(gateway);
        store.bootstrap().await.unwrap();
        assert_eq!(store.active_conversation().as_deref(), Some("x"));

        let (tx, rx) = oneshot::channel();
        gateway.queue_text(Scripted::Gated(rx));
        let sender = store.clone();
        let task = tokio::spawn(async move { sender.send_text("to x").await });
        tokio::task::yield_now().await;

        store.select_conversation("y").await;
        tx.send(Ok(ChatReply::with_reply("late reply"))).unwrap();
        task.await.unwrap().unwrap();

        // Y's visible log is untouched; X still received the reply.
        assert!(store.messages().is_empty());
        let state = store.state();
        assert_eq!(
            texts(&state.logs["x"]),
            vec![(&Role::User, "to x"), (&Role::Bot, "late reply")]
        );
    }

    #[tokio::test]
    async fn test_select_failure_shows_empty_log() {
        let (store, gateway) = store_with(MockGateway::default());
        store.bootstrap().await.unwrap();
        gateway.queue_text(Scripted::Ready(Ok(ChatReply::with_reply("hi"))));
        store.send_text("hola").await.unwrap();

        // Wholesale replacement: switching and coming back re-fetches, it
        // never merges with the prior view.
        store.select_conversation("other").await;
        assert_eq!(store.active_conversation().as_deref(), Some("other"));
        assert!(store.messages().is_empty());
    }

    fn test_clip() -> AudioClip {
        AudioClip {
            bytes: vec![0; 44],
            content_type: "audio/wav",
            file_name: "rec-test.wav".into(),
        }
    }

    #[tokio::test]
    async fn test_audio_placeholder_replaced_exactly_once() {
        let (store, gateway) = store_with(MockGateway::default());
        store.bootstrap().await.unwrap();
        gateway.queue_audio(Scripted::Ready(Ok(ChatReply::with_transcription(
            "plan a trip to Rome",
            "Rome it is",
        ))));

        store.send_audio(test_clip()).await.unwrap();

        let log = store.messages();
        assert!(log.iter().all(|m| m.text != AUDIO_PLACEHOLDER));
        assert_eq!(
            texts(&log),
            vec![
                (&Role::User, "plan a trip to Rome"),
                (&Role::Bot, "Rome it is"),
            ]
        );
        assert!(!store.is_composing());
    }

    #[tokio::test]
    async fn test_audio_failure_removes_placeholder() {
        let (store, gateway) = store_with(MockGateway::default());
        store.bootstrap().await.unwrap();
        gateway.queue_audio(Scripted::Ready(Err(GatewayError::RequestFailed {
            status: 500,
        })));

        assert!(store.send_audio(test_clip()).await.is_err());
        assert!(store.messages().is_empty());
        assert!(!store.is_composing());
        assert_eq!(store.take_notices().len(), 1);
    }

    #[tokio::test]
    async fn test_capture_released_even_when_audio_send_fails() {
        struct TrackingMic {
            stopped: Arc<AtomicBool>,
        }
        impl MicBackend for TrackingMic {
            fn start(&mut self, _sink: CaptureSink) -> Result<u32, CaptureError> {
                Ok(16_000)
            }
            fn stop(&mut self) {
                self.stopped.store(true, Ordering::SeqCst);
            }
        }

        let stopped = Arc::new(AtomicBool::new(false));
        let mut capture = CaptureController::new(TrackingMic {
            stopped: Arc::clone(&stopped),
        });
        capture.start().unwrap();
        let clip = capture.stop().unwrap();

        let (store, gateway) = store_with(MockGateway::default());
        store.bootstrap().await.unwrap();
        gateway.queue_audio(Scripted::Ready(Err(GatewayError::Network("down".into()))));
        assert!(store.send_audio(clip).await.is_err());

        // The device was released when the clip was finalized; the failed
        // send cannot resurrect it.
        assert!(stopped.load(Ordering::SeqCst));
        assert!(!capture.is_recording());
    }

    #[tokio::test]
    async fn test_bot_reply_is_normalized() {
        let (store, gateway) = store_with(MockGateway::default());
        store.bootstrap().await.unwrap();
        gateway.queue_text(Scripted::Ready(Ok(ChatReply::with_reply(
            "Vuela a MÃ¡laga",
        ))));
        store.send_text("vuelos").await.unwrap();
        assert_eq!(store.messages()[1].text, "Vuela a Málaga");
    }

    #[tokio::test]
    async fn test_preview_role_markers_and_truncation() {
        let (store, gateway) = store_with(MockGateway::default());
        store.bootstrap().await.unwrap();
        let id = store.active_conversation().unwrap();
        gateway.queue_text(Scripted::Ready(Ok(ChatReply::with_reply("Hi there"))));
        store.send_text("Hello").await.unwrap();

        assert_eq!(
            store.conversation_preview(&id).as_deref(),
            Some("You: Hello Bot: Hi there")
        );

        gateway.queue_text(Scripted::Ready(Ok(ChatReply::with_reply("ok"))));
        let second = store.create_conversation().await.unwrap();
        store.send_text(&"x".repeat(300)).await.unwrap();
        let preview = store.conversation_preview(&second).unwrap();
        assert_eq!(preview.chars().count(), PREVIEW_BUDGET + 1);
        assert!(preview.ends_with('…'));

        assert!(store.conversation_preview("unknown").is_none());
    }
}
