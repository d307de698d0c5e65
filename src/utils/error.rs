//! Error types and handling
//!
//! Common error types used across the recording pipeline.

use thiserror::Error;

/// Pipeline-wide error type
#[derive(Error, Debug)]
pub enum RecordingError {
    /// An encoder or capture device could not be created with the
    /// requested profile. Fatal to session start.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A required capture device is missing.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Output path/file could not be created or written.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The encoder reported a failure while producing output.
    #[error("Encoder error: {0}")]
    Encoder(String),

    /// The capture device reported a failure while producing input.
    #[error("Capture error: {0}")]
    Capture(String),

    /// An operation was invoked outside its valid state.
    #[error("Invalid state: {0}")]
    State(String),

    /// A recording is already in progress.
    #[error("Recording already in progress")]
    AlreadyRecording,
}

/// Result type alias using RecordingError
pub type RecordingResult<T> = Result<T, RecordingError>;
