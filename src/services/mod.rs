pub mod capture;
pub mod normalize;
pub mod profile;
pub mod session;

pub use capture::{CaptureController, CaptureError, CaptureState, MicBackend};
pub use profile::Profile;
pub use session::{SessionError, SessionStore};
