//! Recording state management
//!
//! Session-level state, configuration, and outcome types. The
//! recording flag lives here, owned by the session, not in any
//! process-wide global.

use crate::encoder::traits::{AudioProfile, VideoProfile};
use crate::utils::error::RecordingResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Current state of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No recording in progress
    Idle,
    /// Currently recording
    Recording,
    /// Recording completed
    Stopped,
}

impl Default for RecordingState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Configuration for starting a recording
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingConfig {
    /// Base directory for output file placement
    pub output_dir: String,

    /// Video encoding profile
    #[serde(default)]
    pub video: VideoProfile,

    /// Audio encoding profile
    #[serde(default)]
    pub audio: AudioProfile,
}

impl RecordingConfig {
    pub fn new(output_dir: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            video: VideoProfile::default(),
            audio: AudioProfile::default(),
        }
    }

    /// Load a config from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> RecordingResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Result of a completed recording
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingOutcome {
    /// Session id
    pub session_id: Uuid,

    /// Path to the finalized container file
    pub output_file: String,

    /// Total duration in milliseconds
    pub duration_ms: f64,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// When the session stopped
    pub stopped_at: DateTime<Utc>,
}
