//! buildlens Runtime
//!
//! Follows an event file while the build is still writing it, keeps a live
//! view of the build, and draws it through one of several render modes.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ingestor;
pub mod monitor;
pub mod render;
pub mod tail;

pub use ingestor::{LiveConfig, LiveError, LiveIngestor, LiveOutcome, LiveSession, LiveState};
pub use monitor::{ActivityRing, LiveView};
pub use render::{
    CollectingSink, DashboardMode, Emission, EmissionSink, LogLineMode, RenderMode,
    StatusLineMode,
};
pub use tail::{TailStats, Tailer};
