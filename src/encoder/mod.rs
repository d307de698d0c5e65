//! Encode loops
//!
//! The two real-time producers of the pipeline:
//! - VideoEncodeLoop drains the surface-fed hardware video encoder
//! - AudioCaptureEncodeLoop reads the capture device and drains the
//!   audio encoder
//! plus the trait seams the external encoders/devices plug into.

pub mod audio;
pub mod traits;
pub mod video;

pub use audio::AudioCaptureEncodeLoop;
pub use traits::{
    AudioEncoder, AudioProfile, AudioSource, EncodedBuffer, EncoderOutput, EncoderState,
    InputSurface, VideoEncoder, VideoProfile,
};
pub use video::VideoEncodeLoop;
