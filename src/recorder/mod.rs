//! Recording session orchestration
//!
//! - RecordingSession drives the lifecycle of one recording
//! - state types for configuration, session state, and outcome

pub mod session;
pub mod state;

pub use session::{RecordingEvent, RecordingSession};
pub use state::{RecordingConfig, RecordingOutcome, RecordingState};
