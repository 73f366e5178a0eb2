//! buildlens Analyzer
//!
//! Folds canonical build events into a build state, correlates console
//! progress with completed actions, resolves target outputs through the
//! named file-set graph, and hands out read-only snapshots.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analyzer;
pub mod capture;
pub mod engine;
pub mod fileset;
pub mod progress;
pub mod snapshot;
pub mod state;

pub use analyzer::Analyzer;
pub use capture::CaptureError;
pub use engine::{AnalysisEngine, AnalyzeError, AnalyzeResult};
pub use fileset::{FileSetResolver, NamedSetGraph, OutputFile};
pub use progress::{parse_progress_text, ProgressInfo, RunningAction};
pub use snapshot::{BuildSnapshot, SnapshotError};
pub use state::{Action, BuildState, FailedTarget, Problem};
