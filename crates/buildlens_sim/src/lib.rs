//! buildlens Stream Simulator
//!
//! Replays a recorded event stream into a file or pipe with realistic
//! pacing, so live mode can be exercised without a running build.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod harness;
pub mod record;

pub use harness::{Pacing, SimConfig, SimError, SimReport, StreamSimulator};
pub use record::{build_timeline, event_time, load_timeline, LoadedTimeline, TimedRecord};
