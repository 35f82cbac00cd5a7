pub mod http;
pub mod traits;
pub mod types;

pub use http::HttpGateway;
pub use traits::SyncGateway;
pub use types::{ChatReply, GatewayError};
