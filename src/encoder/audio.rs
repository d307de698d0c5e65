//! Audio capture + encode loop
//!
//! A single thread alternates bounded reads from the capture device
//! with encoder drains, forwarding encoded samples to the container
//! muxer. Unlike video there is no flush primitive on the capture
//! side; stop is a cooperative flag checked between reads, so one
//! final post-flag read may still be drained and written. The muxer's
//! state checks tolerate that.

use super::traits::{AudioEncoder, AudioProfile, AudioSource, EncoderOutput, EncoderState};
use crate::muxer::sample::{Sample, TrackIndex, TrackKind};
use crate::muxer::ContainerMuxer;
use crate::utils::error::{RecordingError, RecordingResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Fixed raw PCM chunk size per capture read.
const CHUNK_SIZE: usize = 4096;

/// Bounded wait on the capture device.
const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Bounded poll on the encoder output queue while draining a chunk.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);

/// Drains the system-audio capture device through the audio encoder
/// into the muxer.
///
/// Same state machine shape as the video loop; the capture device and
/// encoder handles are owned exclusively by the worker thread once
/// started.
pub struct AudioCaptureEncodeLoop {
    muxer: Arc<ContainerMuxer>,
    profile: AudioProfile,
    encoder: Option<Box<dyn AudioEncoder>>,
    source: Option<Box<dyn AudioSource>>,
    state: Arc<Mutex<EncoderState>>,
    stop_requested: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AudioCaptureEncodeLoop {
    pub fn new(
        encoder: Box<dyn AudioEncoder>,
        source: Box<dyn AudioSource>,
        profile: AudioProfile,
        muxer: Arc<ContainerMuxer>,
    ) -> Self {
        Self {
            muxer,
            profile,
            encoder: Some(encoder),
            source: Some(source),
            state: Arc::new(Mutex::new(EncoderState::Configured)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn state(&self) -> EncoderState {
        *self.state.lock()
    }

    /// Configure encoder and capture device, then launch the
    /// capture+drain thread. Failure is fatal and leaves nothing
    /// allocated.
    pub fn start(&mut self) -> RecordingResult<()> {
        let mut encoder = self
            .encoder
            .take()
            .ok_or_else(|| RecordingError::State("audio loop already started".into()))?;
        let mut source = self
            .source
            .take()
            .ok_or_else(|| RecordingError::State("audio source already consumed".into()))?;

        if let Err(e) = encoder.configure(&self.profile) {
            source.close();
            return Err(e);
        }
        if let Err(e) = encoder.start() {
            encoder.release();
            source.close();
            return Err(e);
        }
        *self.state.lock() = EncoderState::Running;

        let muxer = self.muxer.clone();
        let state = self.state.clone();
        let stop = self.stop_requested.clone();
        let handle = std::thread::spawn(move || {
            capture_loop(source, encoder, muxer, state, stop);
        });
        self.handle = Some(handle);

        tracing::info!(
            "Audio capture loop started ({} Hz, {} ch)",
            self.profile.sample_rate,
            self.profile.channels
        );
        Ok(())
    }

    /// Set the cooperative cancellation flag. Does not wait; pair with
    /// `stop()`.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Request stop and join the worker thread, so no sample can be
    /// written to an already-finalizing muxer afterwards.
    pub fn stop(&mut self) {
        self.request_stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Audio capture thread panicked");
                *self.state.lock() = EncoderState::Released;
            }
        }
        tracing::info!("Audio capture loop stopped");
    }
}

fn capture_loop(
    mut source: Box<dyn AudioSource>,
    mut encoder: Box<dyn AudioEncoder>,
    muxer: Arc<ContainerMuxer>,
    state: Arc<Mutex<EncoderState>>,
    stop: Arc<AtomicBool>,
) {
    let started = Instant::now();
    let mut track: Option<TrackIndex> = None;
    let mut chunk = vec![0u8; CHUNK_SIZE];

    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }

        match source.read(&mut chunk, READ_TIMEOUT) {
            Ok(0) => {}
            Ok(n) => {
                let pts_us = started.elapsed().as_micros() as u64;
                if let Err(e) = encoder.queue_input(&chunk[..n], pts_us) {
                    tracing::warn!("Audio encoder rejected input: {e}");
                }
                if !drain_encoder(&mut *encoder, &muxer, &mut track) {
                    break;
                }
            }
            Err(e) => {
                tracing::error!("Audio capture read failed: {e}");
                break;
            }
        }
    }

    // Flush whatever the encoder still holds before releasing.
    *state.lock() = EncoderState::Draining;
    drain_encoder(&mut *encoder, &muxer, &mut track);
    *state.lock() = EncoderState::EndOfStream;

    // Each release is guarded on its own so one failure cannot skip
    // the next.
    encoder.release();
    source.close();
    *state.lock() = EncoderState::Released;
    tracing::debug!("Audio encoder and capture device released");
}

/// Drain all currently-ready encoder outputs. Returns false on a
/// fatal drain error.
fn drain_encoder(
    encoder: &mut dyn AudioEncoder,
    muxer: &ContainerMuxer,
    track: &mut Option<TrackIndex>,
) -> bool {
    loop {
        match encoder.dequeue_output(DRAIN_TIMEOUT) {
            Ok(EncoderOutput::TimedOut) => return true,
            Ok(EncoderOutput::FormatReady(format)) => {
                match muxer.register_track(TrackKind::Audio, format) {
                    Ok(index) => *track = Some(index),
                    Err(e) => tracing::error!("Audio track registration failed: {e}"),
                }
            }
            Ok(EncoderOutput::Buffer(buffer)) => {
                let id = buffer.id;
                let end_of_stream = buffer.flags.end_of_stream;

                match *track {
                    Some(index) => {
                        let sample = Sample::new(
                            TrackKind::Audio,
                            buffer.payload,
                            buffer.pts_us,
                            buffer.flags,
                        );
                        muxer.write_sample(index, &sample);
                    }
                    None => tracing::warn!("Audio buffer before format-ready, dropping"),
                }
                encoder.release_output(id);

                if end_of_stream {
                    return true;
                }
            }
            Err(e) => {
                tracing::error!("Audio encoder drain error: {e}");
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::traits::EncodedBuffer;
    use crate::muxer::sample::{FormatDescriptor, SampleFlags};
    use crate::muxer::writer::ContainerWriter;
    use crate::muxer::Track;
    use parking_lot::Mutex as PMutex;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct CountingLog {
        samples: usize,
    }

    struct CountingWriter(Arc<PMutex<CountingLog>>);
    impl ContainerWriter for CountingWriter {
        fn write_header(&mut self, _tracks: &[Track]) -> RecordingResult<()> {
            Ok(())
        }
        fn write_sample(&mut self, _i: TrackIndex, _s: &Sample) -> RecordingResult<()> {
            self.0.lock().samples += 1;
            Ok(())
        }
        fn write_trailer(&mut self) -> RecordingResult<()> {
            Ok(())
        }
    }

    /// Yields `chunks` fixed-size reads, then nothing.
    struct ScriptedSource {
        chunks: usize,
        served: usize,
        closed: Arc<AtomicBool>,
    }

    impl AudioSource for ScriptedSource {
        fn read(&mut self, buf: &mut [u8], _t: Duration) -> RecordingResult<usize> {
            if self.served < self.chunks {
                self.served += 1;
                Ok(buf.len())
            } else {
                // Mimic a quiet device: bounded wait, nothing ready.
                std::thread::sleep(Duration::from_millis(1));
                Ok(0)
            }
        }
        fn sample_rate(&self) -> u32 {
            44_100
        }
        fn channels(&self) -> u16 {
            2
        }
        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// One output buffer per queued input, format-ready first.
    struct ScriptedAudioEncoder {
        format_sent: bool,
        queued: VecDeque<u64>,
        emitted: usize,
        dequeued: Arc<PMutex<usize>>,
        released: Arc<AtomicBool>,
    }

    impl ScriptedAudioEncoder {
        fn new(dequeued: Arc<PMutex<usize>>, released: Arc<AtomicBool>) -> Self {
            Self {
                format_sent: false,
                queued: VecDeque::new(),
                emitted: 0,
                dequeued,
                released,
            }
        }
    }

    impl AudioEncoder for ScriptedAudioEncoder {
        fn configure(&mut self, _p: &AudioProfile) -> RecordingResult<()> {
            Ok(())
        }
        fn start(&mut self) -> RecordingResult<()> {
            Ok(())
        }
        fn queue_input(&mut self, _pcm: &[u8], pts_us: u64) -> RecordingResult<()> {
            self.queued.push_back(pts_us);
            Ok(())
        }
        fn dequeue_output(&mut self, _t: Duration) -> RecordingResult<EncoderOutput> {
            if !self.format_sent {
                self.format_sent = true;
                return Ok(EncoderOutput::FormatReady(FormatDescriptor::new(
                    "aac",
                    vec![0x12, 0x10],
                )));
            }
            match self.queued.pop_front() {
                Some(pts_us) => {
                    let id = self.emitted;
                    self.emitted += 1;
                    *self.dequeued.lock() += 1;
                    Ok(EncoderOutput::Buffer(EncodedBuffer {
                        id,
                        payload: vec![0xCD; 64],
                        pts_us,
                        flags: SampleFlags::NONE,
                    }))
                }
                None => Ok(EncoderOutput::TimedOut),
            }
        }
        fn release_output(&mut self, _buffer_id: usize) {}
        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn encodes_all_chunks_and_releases_resources_on_stop() {
        let log = Arc::new(PMutex::new(CountingLog::default()));
        let muxer = Arc::new(ContainerMuxer::new(Box::new(CountingWriter(log.clone()))));
        muxer
            .register_track(TrackKind::Video, FormatDescriptor::new("h264", vec![]))
            .unwrap();

        let dequeued = Arc::new(PMutex::new(0));
        let enc_released = Arc::new(AtomicBool::new(false));
        let src_closed = Arc::new(AtomicBool::new(false));

        let mut audio = AudioCaptureEncodeLoop::new(
            Box::new(ScriptedAudioEncoder::new(
                dequeued.clone(),
                enc_released.clone(),
            )),
            Box::new(ScriptedSource {
                chunks: 8,
                served: 0,
                closed: src_closed.clone(),
            }),
            AudioProfile::default(),
            muxer,
        );
        audio.start().unwrap();

        // Wait for all 8 chunks to pass through the encoder.
        let deadline = Instant::now() + Duration::from_secs(2);
        while *dequeued.lock() < 8 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        audio.stop();

        assert_eq!(log.lock().samples, 8);
        assert_eq!(audio.state(), EncoderState::Released);
        assert!(enc_released.load(Ordering::SeqCst));
        assert!(src_closed.load(Ordering::SeqCst));
    }

    #[test]
    fn stop_before_any_read_releases_cleanly() {
        let log = Arc::new(PMutex::new(CountingLog::default()));
        let muxer = Arc::new(ContainerMuxer::new(Box::new(CountingWriter(log.clone()))));

        let dequeued = Arc::new(PMutex::new(0));
        let enc_released = Arc::new(AtomicBool::new(false));
        let src_closed = Arc::new(AtomicBool::new(false));

        let mut audio = AudioCaptureEncodeLoop::new(
            Box::new(ScriptedAudioEncoder::new(dequeued, enc_released.clone())),
            Box::new(ScriptedSource {
                chunks: 0,
                served: 0,
                closed: src_closed.clone(),
            }),
            AudioProfile::default(),
            muxer,
        );
        audio.start().unwrap();
        audio.stop();

        assert_eq!(audio.state(), EncoderState::Released);
        assert!(enc_released.load(Ordering::SeqCst));
        assert!(src_closed.load(Ordering::SeqCst));
        assert_eq!(log.lock().samples, 0);
    }

    #[test]
    fn stop_is_idempotent() {
        let log = Arc::new(PMutex::new(CountingLog::default()));
        let muxer = Arc::new(ContainerMuxer::new(Box::new(CountingWriter(log))));
        let dequeued = Arc::new(PMutex::new(0));
        let enc_released = Arc::new(AtomicBool::new(false));
        let src_closed = Arc::new(AtomicBool::new(false));

        let mut audio = AudioCaptureEncodeLoop::new(
            Box::new(ScriptedAudioEncoder::new(dequeued, enc_released)),
            Box::new(ScriptedSource {
                chunks: 0,
                served: 0,
                closed: src_closed,
            }),
            AudioProfile::default(),
            muxer,
        );
        audio.start().unwrap();
        audio.stop();
        audio.stop();
        assert_eq!(audio.state(), EncoderState::Released);
    }
}
