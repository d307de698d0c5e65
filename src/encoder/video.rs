//! Video encode loop
//!
//! Drains the hardware video encoder's output queue on a dedicated
//! thread and forwards encoded samples to the container muxer. Frames
//! enter the encoder through its input surface, outside the core.

use super::traits::{EncoderOutput, EncoderState, InputSurface, VideoEncoder, VideoProfile};
use crate::muxer::sample::{Sample, TrackIndex, TrackKind};
use crate::muxer::ContainerMuxer;
use crate::utils::error::{RecordingError, RecordingResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Bounded poll on the encoder output queue. Keeps reaction to a stop
/// request within one iteration.
const POLL_TIMEOUT: Duration = Duration::from_millis(30);

/// Upper bound on draining after end-of-stream was signaled. A stalled
/// encoder must not hang the stop sequence.
const DRAIN_DEADLINE: Duration = Duration::from_secs(2);

/// Drains a surface-fed hardware video encoder into the muxer.
///
/// State machine: Configured -> Running -> Draining -> EndOfStream ->
/// Released. The encoder handle is owned exclusively by the drain
/// thread once started; `stop()` communicates through a cooperative
/// flag and the thread itself signals end-of-stream to the encoder.
pub struct VideoEncodeLoop {
    muxer: Arc<ContainerMuxer>,
    profile: VideoProfile,
    encoder: Option<Box<dyn VideoEncoder>>,
    state: Arc<Mutex<EncoderState>>,
    stop_requested: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl VideoEncodeLoop {
    pub fn new(
        encoder: Box<dyn VideoEncoder>,
        profile: VideoProfile,
        muxer: Arc<ContainerMuxer>,
    ) -> Self {
        Self {
            muxer,
            profile,
            encoder: Some(encoder),
            state: Arc::new(Mutex::new(EncoderState::Configured)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn state(&self) -> EncoderState {
        *self.state.lock()
    }

    /// Configure and start the encoder, launch the drain thread, and
    /// return the input surface for the external frame source.
    ///
    /// Configuration failure is fatal and leaves nothing allocated.
    pub fn start(&mut self) -> RecordingResult<InputSurface> {
        let mut encoder = self
            .encoder
            .take()
            .ok_or_else(|| RecordingError::State("video loop already started".into()))?;

        let surface = encoder.configure(&self.profile)?;
        if let Err(e) = encoder.start() {
            encoder.release();
            return Err(e);
        }
        *self.state.lock() = EncoderState::Running;

        let muxer = self.muxer.clone();
        let state = self.state.clone();
        let stop = self.stop_requested.clone();
        let handle = std::thread::spawn(move || {
            drain_loop(encoder, muxer, state, stop);
        });
        self.handle = Some(handle);

        tracing::info!(
            "Video encode loop started ({}x{} @ {} fps)",
            self.profile.width,
            self.profile.height,
            self.profile.frame_rate
        );
        Ok(surface)
    }

    /// Ask the drain thread to flush the encoder and wind down. Does
    /// not wait; pair with `stop()`.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Request stop and wait for the drain thread to observe the
    /// terminal end-of-stream sample, guaranteeing all buffered frames
    /// reached the muxer before resources were released.
    pub fn stop(&mut self) {
        self.request_stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Video drain thread panicked");
                *self.state.lock() = EncoderState::Released;
            }
        }
        tracing::info!("Video encode loop stopped");
    }
}

fn drain_loop(
    mut encoder: Box<dyn VideoEncoder>,
    muxer: Arc<ContainerMuxer>,
    state: Arc<Mutex<EncoderState>>,
    stop: Arc<AtomicBool>,
) {
    let mut track: Option<TrackIndex> = None;
    let mut eos_signaled = false;
    let mut drain_deadline: Option<Instant> = None;

    loop {
        if stop.load(Ordering::SeqCst) && !eos_signaled {
            match encoder.signal_end_of_stream() {
                Ok(()) => {
                    eos_signaled = true;
                    drain_deadline = Some(Instant::now() + DRAIN_DEADLINE);
                    *state.lock() = EncoderState::Draining;
                }
                Err(e) => {
                    tracing::error!("Failed to signal video end-of-stream: {e}");
                    break;
                }
            }
        }

        match encoder.dequeue_output(POLL_TIMEOUT) {
            Ok(EncoderOutput::TimedOut) => {
                if let Some(deadline) = drain_deadline {
                    if Instant::now() >= deadline {
                        tracing::warn!("Video encoder stalled while draining, giving up");
                        break;
                    }
                }
            }
            Ok(EncoderOutput::FormatReady(format)) => {
                match muxer.register_track(TrackKind::Video, format) {
                    Ok(index) => track = Some(index),
                    Err(e) => tracing::error!("Video track registration failed: {e}"),
                }
            }
            Ok(EncoderOutput::Buffer(buffer)) => {
                let id = buffer.id;
                let end_of_stream = buffer.flags.end_of_stream;

                match track {
                    Some(index) => {
                        let sample = Sample::new(
                            TrackKind::Video,
                            buffer.payload,
                            buffer.pts_us,
                            buffer.flags,
                        );
                        muxer.write_sample(index, &sample);
                    }
                    None => {
                        tracing::warn!("Video buffer before format-ready, dropping");
                    }
                }
                // The slot goes back to the encoder whatever the write
                // outcome.
                encoder.release_output(id);

                if end_of_stream {
                    *state.lock() = EncoderState::EndOfStream;
                    tracing::debug!("Video end-of-stream observed");
                    break;
                }
            }
            Err(e) => {
                // A partially-written file beats a crash: log and wind
                // down cleanly.
                tracing::error!("Video encoder drain error: {e}");
                break;
            }
        }
    }

    encoder.release();
    *state.lock() = EncoderState::Released;
    tracing::debug!("Video encoder released");
}
