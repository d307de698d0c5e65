//! Shared utilities

pub mod error;

pub use error::{RecordingError, RecordingResult};
