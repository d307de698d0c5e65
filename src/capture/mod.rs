//! Capture sources
//!
//! Production implementations of the capture seams. Screen pixels
//! reach the video encoder through its input surface outside the
//! core; only the system-audio source lives here.

pub mod system_audio;

pub use system_audio::SystemAudioSource;
