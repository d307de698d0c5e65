//! Container writer
//!
//! The on-disk container format and the seam the muxer writes through.
//! The writer follows the usual header -> samples -> trailer contract:
//! all track headers go out before the first data record, and the
//! trailer carries the per-track sample counts a reader needs to
//! validate the file.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! "QREC" u16:version u16:track_count
//!   per track: u8:kind u16:codec_len codec u32:config_len config
//! records:
//!   0x01 u16:track u8:flags u64:pts_us u32:len payload
//! trailer:
//!   0xFF u16:track_count (u64:count per track) "QEND"
//! ```

use super::sample::{Sample, Track, TrackIndex, TrackKind};
use crate::utils::error::{RecordingError, RecordingResult};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 4] = b"QREC";
const END_MAGIC: &[u8; 4] = b"QEND";
const FORMAT_VERSION: u16 = 1;

const RECORD_SAMPLE: u8 = 0x01;
const RECORD_TRAILER: u8 = 0xFF;

const FLAG_KEY_FRAME: u8 = 0x01;

/// Sink for one container file.
///
/// Not safe for concurrent invocation; callers must serialize access.
pub trait ContainerWriter: Send {
    /// Write the container header with all track metadata.
    ///
    /// Must be called exactly once, before any sample.
    fn write_header(&mut self, tracks: &[Track]) -> RecordingResult<()>;

    /// Append one sample record.
    fn write_sample(&mut self, index: TrackIndex, sample: &Sample) -> RecordingResult<()>;

    /// Write final structural metadata and flush.
    ///
    /// If the header was never written the file is left empty.
    fn write_trailer(&mut self) -> RecordingResult<()>;
}

/// File-backed container writer.
pub struct FileContainerWriter {
    out: BufWriter<File>,
    path: PathBuf,
    sample_counts: Vec<u64>,
    header_written: bool,
}

impl FileContainerWriter {
    /// Create the output file. Failure here is fatal to session start.
    pub fn create(path: impl AsRef<Path>) -> RecordingResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        tracing::debug!("Container file created: {}", path.display());
        Ok(Self {
            out: BufWriter::new(file),
            path,
            sample_counts: Vec::new(),
            header_written: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContainerWriter for FileContainerWriter {
    fn write_header(&mut self, tracks: &[Track]) -> RecordingResult<()> {
        if self.header_written {
            return Err(RecordingError::State("header already written".into()));
        }

        self.out.write_all(MAGIC)?;
        self.out.write_all(&FORMAT_VERSION.to_le_bytes())?;
        self.out.write_all(&(tracks.len() as u16).to_le_bytes())?;

        for track in tracks {
            let kind = match track.kind {
                TrackKind::Video => 0u8,
                TrackKind::Audio => 1u8,
            };
            self.out.write_all(&[kind])?;
            let codec = track.format.codec.as_bytes();
            self.out.write_all(&(codec.len() as u16).to_le_bytes())?;
            self.out.write_all(codec)?;
            let config = &track.format.codec_config;
            self.out.write_all(&(config.len() as u32).to_le_bytes())?;
            self.out.write_all(config)?;
        }

        self.sample_counts = vec![0; tracks.len()];
        self.header_written = true;
        tracing::debug!("Container header written ({} tracks)", tracks.len());
        Ok(())
    }

    fn write_sample(&mut self, index: TrackIndex, sample: &Sample) -> RecordingResult<()> {
        if !self.header_written {
            return Err(RecordingError::State("header not written".into()));
        }
        if index.0 >= self.sample_counts.len() {
            return Err(RecordingError::State(format!(
                "unknown track index {}",
                index.0
            )));
        }

        let len = sample.effective_len();
        let mut flags = 0u8;
        if sample.flags.key_frame {
            flags |= FLAG_KEY_FRAME;
        }

        self.out.write_all(&[RECORD_SAMPLE])?;
        self.out.write_all(&(index.0 as u16).to_le_bytes())?;
        self.out.write_all(&[flags])?;
        self.out.write_all(&sample.pts_us.to_le_bytes())?;
        self.out.write_all(&(len as u32).to_le_bytes())?;
        self.out.write_all(&sample.payload[..len])?;

        self.sample_counts[index.0] += 1;
        Ok(())
    }

    fn write_trailer(&mut self) -> RecordingResult<()> {
        if !self.header_written {
            // Never started: leave the file empty but flushed.
            self.out.flush()?;
            return Ok(());
        }

        self.out.write_all(&[RECORD_TRAILER])?;
        self.out
            .write_all(&(self.sample_counts.len() as u16).to_le_bytes())?;
        for count in &self.sample_counts {
            self.out.write_all(&count.to_le_bytes())?;
        }
        self.out.write_all(END_MAGIC)?;
        self.out.flush()?;

        let total: u64 = self.sample_counts.iter().sum();
        tracing::info!(
            "Container finalized: {} ({} samples)",
            self.path.display(),
            total
        );
        Ok(())
    }
}

/// Per-track metadata recovered from a finished container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSummary {
    pub kind: TrackKind,
    pub codec: String,
    pub codec_config_len: usize,
    pub sample_count: u64,
}

/// Parsed view of a finished container file, for inspection and tests.
#[derive(Debug, Clone, Default)]
pub struct ContainerSummary {
    pub tracks: Vec<TrackSummary>,
    pub finalized: bool,
}

impl ContainerSummary {
    pub fn total_samples(&self) -> u64 {
        self.tracks.iter().map(|t| t.sample_count).sum()
    }

    /// Parse a container file.
    ///
    /// An empty file (a session stopped before any track registered)
    /// yields an empty summary rather than an error.
    pub fn read_from(path: impl AsRef<Path>) -> RecordingResult<Self> {
        let file = File::open(path.as_ref())?;
        if file.metadata()?.len() == 0 {
            return Ok(Self::default());
        }
        let mut r = BufReader::new(file);

        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(RecordingError::State("bad container magic".into()));
        }
        let version = read_u16(&mut r)?;
        if version != FORMAT_VERSION {
            return Err(RecordingError::State(format!(
                "unsupported container version {version}"
            )));
        }

        let track_count = read_u16(&mut r)? as usize;
        let mut tracks = Vec::with_capacity(track_count);
        for _ in 0..track_count {
            let kind = match read_u8(&mut r)? {
                0 => TrackKind::Video,
                1 => TrackKind::Audio,
                other => {
                    return Err(RecordingError::State(format!("bad track kind {other}")));
                }
            };
            let codec_len = read_u16(&mut r)? as usize;
            let mut codec = vec![0u8; codec_len];
            r.read_exact(&mut codec)?;
            let config_len = read_u32(&mut r)? as usize;
            let mut config = vec![0u8; config_len];
            r.read_exact(&mut config)?;
            tracks.push(TrackSummary {
                kind,
                codec: String::from_utf8_lossy(&codec).into_owned(),
                codec_config_len: config_len,
                sample_count: 0,
            });
        }

        let mut summary = ContainerSummary {
            tracks,
            finalized: false,
        };

        loop {
            let tag = match read_u8(&mut r) {
                Ok(t) => t,
                // Truncated file (crash before trailer): report what we saw.
                Err(_) => return Ok(summary),
            };
            match tag {
                RECORD_SAMPLE => {
                    let index = read_u16(&mut r)? as usize;
                    let _flags = read_u8(&mut r)?;
                    let _pts = read_u64(&mut r)?;
                    let len = read_u32(&mut r)? as usize;
                    let mut payload = vec![0u8; len];
                    r.read_exact(&mut payload)?;
                    if let Some(track) = summary.tracks.get_mut(index) {
                        track.sample_count += 1;
                    }
                }
                RECORD_TRAILER => {
                    let count = read_u16(&mut r)? as usize;
                    for i in 0..count {
                        let declared = read_u64(&mut r)?;
                        if let Some(track) = summary.tracks.get(i) {
                            if track.sample_count != declared {
                                return Err(RecordingError::State(format!(
                                    "trailer count mismatch on track {i}: \
                                     {declared} declared, {} seen",
                                    track.sample_count
                                )));
                            }
                        }
                    }
                    let mut end = [0u8; 4];
                    r.read_exact(&mut end)?;
                    if &end != END_MAGIC {
                        return Err(RecordingError::State("bad end magic".into()));
                    }
                    summary.finalized = true;
                    return Ok(summary);
                }
                other => {
                    return Err(RecordingError::State(format!("bad record tag {other:#x}")));
                }
            }
        }
    }
}

fn read_u8(r: &mut impl Read) -> RecordingResult<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

fn read_u16(r: &mut impl Read) -> RecordingResult<u16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(u16::from_le_bytes(b))
}

fn read_u32(r: &mut impl Read) -> RecordingResult<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn read_u64(r: &mut impl Read) -> RecordingResult<u64> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(u64::from_le_bytes(b))
}
