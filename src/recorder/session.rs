//! Recording session
//!
//! Orchestrates the recording lifecycle: creates the container muxer
//! bound to a fresh output path, starts both encode loops, and on stop
//! enforces the teardown order that keeps the output file valid —
//! both producers fully drained before the container is finalized.

use super::state::{RecordingConfig, RecordingOutcome, RecordingState};
use crate::encoder::audio::AudioCaptureEncodeLoop;
use crate::encoder::traits::{AudioEncoder, AudioSource, InputSurface, VideoEncoder};
use crate::encoder::video::VideoEncodeLoop;
use crate::muxer::writer::FileContainerWriter;
use crate::muxer::ContainerMuxer;
use crate::utils::error::{RecordingError, RecordingResult};
use chrono::{DateTime, Local, Utc};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted during recording
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    /// Recording started
    Started,
    /// Recording stopped
    Stopped,
    /// Recording failed to start
    Error(String),
}

/// One screen + system audio recording, from start to finalized file.
pub struct RecordingSession {
    /// Session id
    id: Uuid,

    config: RecordingConfig,

    /// Current session state
    state: Arc<RwLock<RecordingState>>,

    /// Encoders and capture source, held until start
    video_encoder: Option<Box<dyn VideoEncoder>>,
    audio_encoder: Option<Box<dyn AudioEncoder>>,
    audio_source: Option<Box<dyn AudioSource>>,

    /// Live pipeline, between start and stop
    muxer: Option<Arc<ContainerMuxer>>,
    video: Option<VideoEncodeLoop>,
    audio: Option<AudioCaptureEncodeLoop>,

    output_path: Option<PathBuf>,
    started_at: Option<(Instant, DateTime<Utc>)>,

    /// Event broadcaster
    event_tx: broadcast::Sender<RecordingEvent>,
}

impl RecordingSession {
    /// Create a session around externally-supplied encoder and capture
    /// handles. Nothing is allocated until `start()`.
    pub fn new(
        config: RecordingConfig,
        video_encoder: Box<dyn VideoEncoder>,
        audio_encoder: Box<dyn AudioEncoder>,
        audio_source: Box<dyn AudioSource>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(16);
        Self {
            id: Uuid::new_v4(),
            config,
            state: Arc::new(RwLock::new(RecordingState::Idle)),
            video_encoder: Some(video_encoder),
            audio_encoder: Some(audio_encoder),
            audio_source: Some(audio_source),
            muxer: None,
            video: None,
            audio: None,
            output_path: None,
            started_at: None,
            event_tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the current session state
    pub fn state(&self) -> RecordingState {
        *self.state.read()
    }

    pub fn is_recording(&self) -> bool {
        self.state() == RecordingState::Recording
    }

    /// Path of the output file, once started.
    pub fn output_path(&self) -> Option<&PathBuf> {
        self.output_path.as_ref()
    }

    /// Subscribe to session lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    /// Start recording.
    ///
    /// Creates the output file, the muxer, and both encode loops
    /// (video first, then audio; the muxer accepts either registration
    /// order). Returns the video input surface for the external
    /// screen-capture system. On any failure, everything already
    /// acquired is torn down before the error is returned.
    pub async fn start(&mut self) -> RecordingResult<InputSurface> {
        if self.state() != RecordingState::Idle {
            return Err(RecordingError::AlreadyRecording);
        }

        let video_encoder = self
            .video_encoder
            .take()
            .ok_or_else(|| RecordingError::State("session already consumed".into()))?;
        let audio_encoder = self
            .audio_encoder
            .take()
            .ok_or_else(|| RecordingError::State("session already consumed".into()))?;
        let audio_source = self
            .audio_source
            .take()
            .ok_or_else(|| RecordingError::State("session already consumed".into()))?;

        let output_path = self.build_output_path()?;
        tracing::info!("Starting recording to: {}", output_path.display());

        let writer = match FileContainerWriter::create(&output_path) {
            Ok(w) => w,
            Err(e) => {
                let _ = self.event_tx.send(RecordingEvent::Error(e.to_string()));
                return Err(e);
            }
        };
        let muxer = Arc::new(ContainerMuxer::new(Box::new(writer)));

        let mut video = VideoEncodeLoop::new(video_encoder, self.config.video.clone(), muxer.clone());
        let surface = match video.start() {
            Ok(s) => s,
            Err(e) => {
                muxer.finalize();
                let _ = self.event_tx.send(RecordingEvent::Error(e.to_string()));
                return Err(e);
            }
        };

        let mut audio = AudioCaptureEncodeLoop::new(
            audio_encoder,
            audio_source,
            self.config.audio.clone(),
            muxer.clone(),
        );
        if let Err(e) = audio.start() {
            // Unwind the half-started pipeline before surfacing.
            video.stop();
            muxer.finalize();
            let _ = self.event_tx.send(RecordingEvent::Error(e.to_string()));
            return Err(e);
        }

        self.muxer = Some(muxer);
        self.video = Some(video);
        self.audio = Some(audio);
        self.output_path = Some(output_path);
        self.started_at = Some((Instant::now(), Utc::now()));
        *self.state.write() = RecordingState::Recording;
        let _ = self.event_tx.send(RecordingEvent::Started);

        tracing::info!("Recording started (session {})", self.id);
        Ok(surface)
    }

    /// Stop recording and finalize the container.
    ///
    /// In order: signal both loops, wait for both to drain and release,
    /// only then finalize the muxer. Finalizing earlier would drop
    /// buffered tail samples or write into a closing container.
    /// Idempotent: a second call returns `Ok(None)`.
    pub async fn stop(&mut self) -> RecordingResult<Option<RecordingOutcome>> {
        if self.state() != RecordingState::Recording {
            tracing::debug!("Stop ignored: session not recording");
            return Ok(None);
        }

        tracing::info!("Stopping recording (session {})", self.id);

        let video = self.video.take();
        let audio = self.audio.take();

        // (1) Signal both producers before waiting on either.
        if let Some(v) = &video {
            v.request_stop();
        }
        if let Some(a) = &audio {
            a.request_stop();
        }

        // (2) Join both drain threads off the async executor.
        let joined = tokio::task::spawn_blocking(move || {
            if let Some(mut v) = video {
                v.stop();
            }
            if let Some(mut a) = audio {
                a.stop();
            }
        })
        .await;
        if let Err(e) = joined {
            tracing::error!("Worker join task failed: {e}");
        }

        // (3) Both producers are drained; the container can close.
        if let Some(muxer) = self.muxer.take() {
            muxer.finalize();
        }

        *self.state.write() = RecordingState::Stopped;
        let _ = self.event_tx.send(RecordingEvent::Stopped);

        let stopped_at = Utc::now();
        let (started_instant, started_at) = self
            .started_at
            .unwrap_or((Instant::now(), stopped_at));
        let outcome = RecordingOutcome {
            session_id: self.id,
            output_file: self
                .output_path
                .as_ref()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default(),
            duration_ms: started_instant.elapsed().as_secs_f64() * 1000.0,
            started_at,
            stopped_at,
        };

        tracing::info!(
            "Recording stopped. Duration: {:.0}ms, file: {}",
            outcome.duration_ms,
            outcome.output_file
        );
        Ok(Some(outcome))
    }

    /// Timestamped output path under the configured base directory.
    /// Collision-avoiding by construction, not by explicit check.
    fn build_output_path(&self) -> RecordingResult<PathBuf> {
        let dir = PathBuf::from(&self.config.output_dir);
        std::fs::create_dir_all(&dir)?;
        let stamp = Local::now().format("%d-%m-%Y_%H-%M-%S");
        Ok(dir.join(format!("recorded_{stamp}.qrec")))
    }
}
