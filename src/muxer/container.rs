//! Container muxer
//!
//! Gates the container writer until every expected track has
//! registered, serializes the two producer threads behind one lock,
//! and finalizes the container exactly once on teardown.

use super::sample::{FormatDescriptor, Sample, Track, TrackIndex, TrackKind};
use super::writer::ContainerWriter;
use crate::utils::error::{RecordingError, RecordingResult};
use parking_lot::Mutex;

/// Exactly one video and one audio track per session.
const EXPECTED_TRACKS: usize = 2;

/// Lifecycle of the muxer.
///
/// Writes are accepted only in `Started`; registration only before it.
/// The transition to `Started` happens exactly once, when the second
/// distinct track registers, regardless of arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxerState {
    Idle,
    AwaitingTracks,
    Started,
    Finalizing,
    Released,
}

struct MuxerInner {
    state: MuxerState,
    tracks: Vec<Track>,
    writer: Box<dyn ContainerWriter>,
    dropped_samples: u64,
}

/// Shared container writer for both encode loops.
///
/// All state lives behind one mutex; registration, the `Started`
/// transition, and sample writes are indivisible with respect to the
/// other producer thread.
pub struct ContainerMuxer {
    inner: Mutex<MuxerInner>,
}

impl ContainerMuxer {
    pub fn new(writer: Box<dyn ContainerWriter>) -> Self {
        Self {
            inner: Mutex::new(MuxerInner {
                state: MuxerState::Idle,
                tracks: Vec::new(),
                writer,
                dropped_samples: 0,
            }),
        }
    }

    pub fn state(&self) -> MuxerState {
        self.inner.lock().state
    }

    pub fn is_started(&self) -> bool {
        self.state() == MuxerState::Started
    }

    /// Register one track and return its index.
    ///
    /// Fails with a state error once the muxer has started (or later),
    /// and on a duplicate registration of the same kind. When the
    /// second distinct kind arrives, the track headers are written and
    /// the muxer transitions to `Started` under the same lock hold.
    pub fn register_track(
        &self,
        kind: TrackKind,
        format: FormatDescriptor,
    ) -> RecordingResult<TrackIndex> {
        let mut inner = self.inner.lock();

        match inner.state {
            MuxerState::Idle | MuxerState::AwaitingTracks => {}
            state => {
                return Err(RecordingError::State(format!(
                    "cannot register {} track in {state:?}",
                    kind.as_str()
                )));
            }
        }
        if inner.tracks.iter().any(|t| t.kind == kind) {
            return Err(RecordingError::State(format!(
                "{} track already registered",
                kind.as_str()
            )));
        }

        let index = TrackIndex(inner.tracks.len());
        inner.tracks.push(Track {
            kind,
            format,
            index,
        });
        inner.state = MuxerState::AwaitingTracks;
        tracing::info!("Track registered: {} -> index {}", kind.as_str(), index.0);

        if inner.tracks.len() == EXPECTED_TRACKS {
            // Container formats need every track header before the
            // first data record, hence the gate. A header-write failure
            // is logged like any other mid-session I/O failure; the
            // state transition itself stands.
            let tracks = inner.tracks.clone();
            if let Err(e) = inner.writer.write_header(&tracks) {
                tracing::error!("Failed to write container header: {e}");
            }
            inner.state = MuxerState::Started;
            tracing::info!("Muxer started ({EXPECTED_TRACKS} tracks)");
        }

        Ok(index)
    }

    /// Write one sample.
    ///
    /// Silently dropped when the muxer is not started, the index is
    /// unassigned, or the effective payload is empty (codec-config
    /// buffers are consumed at registration, never written). Write
    /// errors are logged and the sample dropped; recording continues.
    pub fn write_sample(&self, index: TrackIndex, sample: &Sample) {
        let mut inner = self.inner.lock();

        if inner.state != MuxerState::Started {
            inner.dropped_samples += 1;
            tracing::trace!(
                "Dropping {} sample: muxer in {:?}",
                sample.kind.as_str(),
                inner.state
            );
            return;
        }
        if index.0 >= inner.tracks.len() {
            inner.dropped_samples += 1;
            tracing::warn!("Dropping sample for unassigned track index {}", index.0);
            return;
        }
        if sample.effective_len() == 0 {
            return;
        }

        if let Err(e) = inner.writer.write_sample(index, sample) {
            inner.dropped_samples += 1;
            tracing::error!("Sample write failed on track {}: {e}", index.0);
        }
    }

    /// Flush and close the container.
    ///
    /// Idempotent; close errors are logged and never propagated so the
    /// caller can always finish releasing resources.
    pub fn finalize(&self) {
        let mut inner = self.inner.lock();

        match inner.state {
            MuxerState::Started => {
                inner.state = MuxerState::Finalizing;
                if let Err(e) = inner.writer.write_trailer() {
                    tracing::error!("Error finalizing container: {e}");
                }
            }
            MuxerState::Idle | MuxerState::AwaitingTracks => {
                // Never started: nothing structural to write, but the
                // writer still gets a chance to flush and close.
                if let Err(e) = inner.writer.write_trailer() {
                    tracing::error!("Error closing unstarted container: {e}");
                }
            }
            MuxerState::Finalizing | MuxerState::Released => {
                tracing::debug!("Muxer already finalized");
                return;
            }
        }

        if inner.dropped_samples > 0 {
            tracing::warn!("{} samples dropped during session", inner.dropped_samples);
        }
        inner.state = MuxerState::Released;
        tracing::info!("Muxer released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::muxer::sample::SampleFlags;
    use parking_lot::Mutex as PMutex;
    use std::sync::Arc;

    /// In-memory writer recording every call, for gating tests.
    #[derive(Default)]
    struct RecordingWriterLog {
        header_tracks: Option<usize>,
        samples: Vec<(usize, usize)>, // (track, effective len)
        trailers: usize,
    }

    struct MemWriter(Arc<PMutex<RecordingWriterLog>>);

    impl ContainerWriter for MemWriter {
        fn write_header(&mut self, tracks: &[Track]) -> RecordingResult<()> {
            self.0.lock().header_tracks = Some(tracks.len());
            Ok(())
        }
        fn write_sample(&mut self, index: TrackIndex, sample: &Sample) -> RecordingResult<()> {
            self.0.lock().samples.push((index.0, sample.effective_len()));
            Ok(())
        }
        fn write_trailer(&mut self) -> RecordingResult<()> {
            self.0.lock().trailers += 1;
            Ok(())
        }
    }

    fn muxer() -> (ContainerMuxer, Arc<PMutex<RecordingWriterLog>>) {
        let log = Arc::new(PMutex::new(RecordingWriterLog::default()));
        (ContainerMuxer::new(Box::new(MemWriter(log.clone()))), log)
    }

    fn fmt(codec: &str) -> FormatDescriptor {
        FormatDescriptor::new(codec, vec![1, 2, 3])
    }

    #[test]
    fn starts_exactly_when_second_track_registers_video_first() {
        let (m, log) = muxer();
        let v = m.register_track(TrackKind::Video, fmt("h264")).unwrap();
        assert_eq!(m.state(), MuxerState::AwaitingTracks);
        assert!(log.lock().header_tracks.is_none());

        let a = m.register_track(TrackKind::Audio, fmt("aac")).unwrap();
        assert_eq!(m.state(), MuxerState::Started);
        assert_eq!(log.lock().header_tracks, Some(2));
        assert_ne!(v, a);
    }

    #[test]
    fn starts_exactly_when_second_track_registers_audio_first() {
        let (m, _log) = muxer();
        let a = m.register_track(TrackKind::Audio, fmt("aac")).unwrap();
        assert_eq!(m.state(), MuxerState::AwaitingTracks);
        let v = m.register_track(TrackKind::Video, fmt("h264")).unwrap();
        assert_eq!(m.state(), MuxerState::Started);
        assert_eq!(a, TrackIndex(0));
        assert_eq!(v, TrackIndex(1));
    }

    #[test]
    fn duplicate_kind_registration_is_a_state_error() {
        let (m, _log) = muxer();
        m.register_track(TrackKind::Video, fmt("h264")).unwrap();
        assert!(m.register_track(TrackKind::Video, fmt("h264")).is_err());
    }

    #[test]
    fn registration_after_start_is_a_state_error() {
        let (m, _log) = muxer();
        m.register_track(TrackKind::Video, fmt("h264")).unwrap();
        m.register_track(TrackKind::Audio, fmt("aac")).unwrap();
        assert!(m.register_track(TrackKind::Video, fmt("h264")).is_err());
    }

    #[test]
    fn writes_before_start_are_dropped_silently() {
        let (m, log) = muxer();
        let v = m.register_track(TrackKind::Video, fmt("h264")).unwrap();
        let sample = Sample::new(TrackKind::Video, vec![1, 2, 3], 0, SampleFlags::NONE);
        m.write_sample(v, &sample);
        assert!(log.lock().samples.is_empty());

        m.register_track(TrackKind::Audio, fmt("aac")).unwrap();
        m.write_sample(v, &sample);
        assert_eq!(log.lock().samples.len(), 1);
    }

    #[test]
    fn codec_config_samples_never_reach_the_writer() {
        let (m, log) = muxer();
        let v = m.register_track(TrackKind::Video, fmt("h264")).unwrap();
        m.register_track(TrackKind::Audio, fmt("aac")).unwrap();

        let config = Sample::new(
            TrackKind::Video,
            vec![0, 0, 0, 1],
            0,
            SampleFlags {
                codec_config: true,
                ..Default::default()
            },
        );
        m.write_sample(v, &config);

        let empty = Sample::new(TrackKind::Video, Vec::new(), 0, SampleFlags::NONE);
        m.write_sample(v, &empty);
        assert!(log.lock().samples.is_empty());
    }

    #[test]
    fn finalize_is_idempotent() {
        let (m, log) = muxer();
        m.register_track(TrackKind::Video, fmt("h264")).unwrap();
        m.register_track(TrackKind::Audio, fmt("aac")).unwrap();
        m.finalize();
        m.finalize();
        assert_eq!(m.state(), MuxerState::Released);
        assert_eq!(log.lock().trailers, 1);
    }

    #[test]
    fn finalize_on_never_started_muxer_releases_cleanly() {
        let (m, log) = muxer();
        m.finalize();
        assert_eq!(m.state(), MuxerState::Released);
        assert!(log.lock().header_tracks.is_none());

        // Second call is still a no-op.
        m.finalize();
        assert_eq!(log.lock().trailers, 1);
    }

    #[test]
    fn writes_after_finalize_are_dropped() {
        let (m, log) = muxer();
        let v = m.register_track(TrackKind::Video, fmt("h264")).unwrap();
        m.register_track(TrackKind::Audio, fmt("aac")).unwrap();
        m.finalize();
        let sample = Sample::new(TrackKind::Video, vec![1], 0, SampleFlags::NONE);
        m.write_sample(v, &sample);
        assert!(log.lock().samples.is_empty());
    }

    #[test]
    fn concurrent_registration_starts_exactly_once() {
        for _ in 0..50 {
            let (m, log) = muxer();
            let m = Arc::new(m);
            let m1 = m.clone();
            let m2 = m.clone();
            let t1 =
                std::thread::spawn(move || m1.register_track(TrackKind::Video, fmt("h264")));
            let t2 =
                std::thread::spawn(move || m2.register_track(TrackKind::Audio, fmt("aac")));
            let r1 = t1.join().unwrap().unwrap();
            let r2 = t2.join().unwrap().unwrap();
            assert_ne!(r1, r2);
            assert_eq!(m.state(), MuxerState::Started);
            assert_eq!(log.lock().header_tracks, Some(2));
        }
    }
}
