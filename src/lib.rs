//! quickrec - synchronized screen + system audio recording.
//!
//! The core of the pipeline: two independent encoder drain loops
//! (video, audio) feeding one gated container muxer, orchestrated by a
//! RecordingSession whose stop sequence guarantees a playable file
//! even under abrupt cancellation. Screen-capture consent, raw frame
//! delivery, and the UI surface are external collaborators plugged in
//! through the traits in [`encoder`].

pub mod capture;
pub mod encoder;
pub mod muxer;
pub mod recorder;
pub mod utils;

pub use encoder::{AudioProfile, InputSurface, VideoProfile};
pub use muxer::{ContainerMuxer, ContainerSummary};
pub use recorder::{RecordingConfig, RecordingEvent, RecordingOutcome, RecordingSession, RecordingState};
pub use utils::{RecordingError, RecordingResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quickrec=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
