//! Container muxing
//!
//! This module implements the shared sample sink of the pipeline:
//! - Sample/Track data model
//! - ContainerWriter seam and the on-disk container format
//! - ContainerMuxer, which gates writing until both tracks register

pub mod container;
pub mod sample;
pub mod writer;

pub use container::{ContainerMuxer, MuxerState};
pub use sample::{FormatDescriptor, Sample, SampleFlags, Track, TrackIndex, TrackKind};
pub use writer::{ContainerSummary, ContainerWriter, FileContainerWriter, TrackSummary};
