//! Session core for a voice-enabled travel-planning chat client.
//!
//! This crate is the non-visual half of the client: it keeps a local view
//! of multi-turn conversations in sync with the remote chat service,
//! normalizes the service's historically divergent (and occasionally
//! mojibake-ridden) payloads into one stable message model, and runs the
//! microphone capture session that turns speech into an audio clip the
//! session can send like any text message.
//!
//! Presentation is a consumer, not a participant: rendering, cards and
//! routing live elsewhere and only read the projections exposed by
//! [`services::session::SessionStore`].

pub mod config;
pub mod gateway;
pub mod models;
pub mod services;

pub use config::GatewayConfig;
pub use gateway::{HttpGateway, SyncGateway};
pub use models::{Conversation, Message, Role, TravelPayload};
pub use services::capture::{CaptureController, CaptureState};
pub use services::profile::Profile;
pub use services::session::SessionStore;
