//! Sample and track data model
//!
//! Runtime types flowing from the encode loops into the muxer. These
//! are hot-path types and are deliberately not serializable.

/// Which logical stream a sample or track belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
        }
    }
}

/// Flags carried by an encoded buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleFlags {
    /// Buffer carries stream setup metadata, not playable data.
    pub codec_config: bool,
    /// Terminal buffer; the encoder will emit no further output.
    pub end_of_stream: bool,
    /// Sample is a sync point (video key frame).
    pub key_frame: bool,
}

impl SampleFlags {
    pub const NONE: SampleFlags = SampleFlags {
        codec_config: false,
        end_of_stream: false,
        key_frame: false,
    };

    pub fn key_frame() -> Self {
        SampleFlags {
            key_frame: true,
            ..Default::default()
        }
    }

    pub fn end_of_stream() -> Self {
        SampleFlags {
            end_of_stream: true,
            ..Default::default()
        }
    }
}

/// One unit of encoded output.
///
/// Immutable once produced. Ownership stays with the encode loop; the
/// muxer borrows it only for the duration of the write call.
#[derive(Debug, Clone)]
pub struct Sample {
    pub kind: TrackKind,
    pub payload: Vec<u8>,
    /// Declared byte length; the payload is sliced to this on write.
    pub len: usize,
    /// Presentation timestamp in microseconds, monotonic per track.
    pub pts_us: u64,
    pub flags: SampleFlags,
}

impl Sample {
    pub fn new(kind: TrackKind, payload: Vec<u8>, pts_us: u64, flags: SampleFlags) -> Self {
        let len = payload.len();
        Self {
            kind,
            payload,
            len,
            pts_us,
            flags,
        }
    }

    /// Effective payload length after codec-config stripping.
    ///
    /// Configuration payloads are consumed at track registration time,
    /// never written as samples, so their effective length is zero.
    pub fn effective_len(&self) -> usize {
        if self.flags.codec_config {
            0
        } else {
            self.len.min(self.payload.len())
        }
    }
}

/// Opaque encoder-specific stream metadata, consumed at registration.
#[derive(Debug, Clone)]
pub struct FormatDescriptor {
    /// Codec name, e.g. "h264" or "aac".
    pub codec: String,
    /// Codec configuration blob (SPS/PPS, AudioSpecificConfig, ...).
    pub codec_config: Vec<u8>,
}

impl FormatDescriptor {
    pub fn new(codec: impl Into<String>, codec_config: Vec<u8>) -> Self {
        Self {
            codec: codec.into(),
            codec_config,
        }
    }
}

/// Index of a registered track, assigned exactly once by the muxer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackIndex(pub usize);

/// One logical encoded stream registered with the muxer.
#[derive(Debug, Clone)]
pub struct Track {
    pub kind: TrackKind,
    pub format: FormatDescriptor,
    pub index: TrackIndex,
}
