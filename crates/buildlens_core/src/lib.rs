//! buildlens Core Types
//!
//! This crate contains pure types and logic with no I/O.
//! Shared by the decoder, the analyzer, the live ingestor and the simulator.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod label;
pub mod time;

// Re-exports
pub use config::{AnalyzerConfig, DetailLevel, DEFAULT_MAX_CAPTURE_BYTES};
pub use error::{CoreError, CoreResult};
pub use label::{normalize_label, BuildPattern, PatternSet};
pub use time::{format_duration_ms, parse_duration_ms, Timestamp};
