//! Verification flows: email OTP, PAN and GST.

pub mod email;
pub mod gst;
pub mod orchestrator;
pub mod pan;
pub mod state;

pub use email::{EmailState, ResendCooldown};
pub use gst::GstDetails;
pub use orchestrator::VerificationOrchestrator;
pub use pan::PanMatch;
pub use state::{VerificationEvent, VerificationState};
