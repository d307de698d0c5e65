//! Encoder and capture seams
//!
//! Platform-agnostic traits for the hardware encoders and the audio
//! capture session. The drain loops own these handles exclusively and
//! drive them from dedicated threads; implementations must be `Send`
//! but are never shared between threads.

use crate::muxer::sample::{FormatDescriptor, SampleFlags};
use crate::utils::error::RecordingResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Target video encoding profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoProfile {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Target bitrate in bits per second
    pub bit_rate: u32,

    /// Frames per second
    pub frame_rate: u32,

    /// Key frame interval in seconds
    pub key_frame_interval_secs: u32,
}

impl Default for VideoProfile {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            bit_rate: 5 * 1024 * 1024,
            frame_rate: 30,
            key_frame_interval_secs: 1,
        }
    }
}

/// Target audio encoding profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioProfile {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Channel count (2 = stereo)
    pub channels: u16,

    /// Target bitrate in bits per second
    pub bit_rate: u32,
}

impl Default for AudioProfile {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            bit_rate: 128_000,
        }
    }
}

/// Opaque handle to the video encoder's input surface.
///
/// Produced when the video encoder is configured and handed to the
/// external screen-capture system, which draws frames into it. The
/// core never touches it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSurface(u64);

impl InputSurface {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// One encoder output buffer ready to be consumed.
///
/// The buffer slot must be handed back via `release_output` after the
/// payload has been forwarded, whatever the write outcome.
#[derive(Debug, Clone)]
pub struct EncodedBuffer {
    /// Slot id to release back to the encoder
    pub id: usize,
    pub payload: Vec<u8>,
    /// Presentation timestamp in microseconds
    pub pts_us: u64,
    pub flags: SampleFlags,
}

/// Result of polling an encoder's output queue.
#[derive(Debug, Clone)]
pub enum EncoderOutput {
    /// Nothing ready within the timeout.
    TimedOut,
    /// Output format is known; emitted at most once, before any data.
    FormatReady(FormatDescriptor),
    /// An encoded buffer is ready.
    Buffer(EncodedBuffer),
}

/// Per-loop encoder lifecycle.
///
/// Monotonic; `Released` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Configured,
    Running,
    Draining,
    EndOfStream,
    Released,
}

/// Hardware video encoder fed through an input surface.
pub trait VideoEncoder: Send {
    /// Apply the profile and return the input surface for the external
    /// frame source. Failure is fatal to session start.
    fn configure(&mut self, profile: &VideoProfile) -> RecordingResult<InputSurface>;

    /// Begin encoding.
    fn start(&mut self) -> RecordingResult<()>;

    /// Poll the output queue with a bounded timeout.
    fn dequeue_output(&mut self, timeout: Duration) -> RecordingResult<EncoderOutput>;

    /// Hand a buffer slot back to the encoder.
    fn release_output(&mut self, buffer_id: usize);

    /// Ask the encoder to flush and emit a terminal end-of-stream
    /// buffer after all pending frames.
    fn signal_end_of_stream(&mut self) -> RecordingResult<()>;

    /// Release the encoder. Must not fail.
    fn release(&mut self);
}

/// Hardware audio encoder fed with raw PCM chunks.
pub trait AudioEncoder: Send {
    /// Apply the profile. Failure is fatal to session start.
    fn configure(&mut self, profile: &AudioProfile) -> RecordingResult<()>;

    /// Begin encoding.
    fn start(&mut self) -> RecordingResult<()>;

    /// Queue one raw PCM chunk with its presentation timestamp.
    fn queue_input(&mut self, pcm: &[u8], pts_us: u64) -> RecordingResult<()>;

    /// Poll the output queue with a bounded timeout.
    fn dequeue_output(&mut self, timeout: Duration) -> RecordingResult<EncoderOutput>;

    /// Hand a buffer slot back to the encoder.
    fn release_output(&mut self, buffer_id: usize);

    /// Release the encoder. Must not fail.
    fn release(&mut self);
}

/// Live audio capture session, supplied by the external consent flow.
pub trait AudioSource: Send {
    /// Read raw PCM into `buf`, blocking at most `timeout`.
    ///
    /// `Ok(0)` means nothing was available yet; it is not end of input.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> RecordingResult<usize>;

    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Release the capture device. Must not fail.
    fn close(&mut self);
}
