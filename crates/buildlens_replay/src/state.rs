//! Build state reconstructed from the event stream.

use crate::fileset::NamedSetGraph;
use crate::progress::ProgressInfo;
use buildlens_core::{PatternSet, Timestamp};
use buildlens_log::event::{
    BuildFinished, BuildMetrics, BuildStarted, BuildToolLogs, Configuration,
    ConvenienceSymlink, EventKind, OptionsParsed, StructuredCommandLine, TestSummary,
    WorkspaceStatus,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Console error/warning lines kept per list
pub const MAX_CONSOLE_LINES: usize = 500;

/// One completed build action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Whether the action succeeded
    pub success: bool,
    /// Action type, e.g. `CppCompile`
    pub mnemonic: String,
    /// Owning target label
    pub label: String,
    /// First output path
    pub primary_output: String,
    /// Configuration id
    pub configuration: Option<String>,
    /// Exit code when the action ran
    pub exit_code: Option<i32>,
    /// Captured only when the detail policy asks for it
    pub command_line: Option<Vec<String>>,
    /// Captured stderr text or a placeholder explaining its absence
    pub stderr: Option<String>,
    /// Execution strategy recovered from progress output
    pub strategy: Option<String>,
    /// Wall time in milliseconds
    pub duration_ms: u64,
    /// When the action started
    pub start_time: Option<Timestamp>,
}

/// A problem reported through an aborted event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Abort reason
    pub reason: String,
    /// Human readable description
    pub description: String,
    /// Kind of the event that was aborted
    pub subject: EventKind,
    /// Target label when the aborted event names one
    pub label: Option<String>,
}

/// A target that completed unsuccessfully
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTarget {
    /// Target label
    pub label: String,
    /// Configuration id
    pub configuration: Option<String>,
    /// Failure detail when one was reported
    pub message: Option<String>,
}

/// Everything accumulated for one analysis session.
///
/// Owned by exactly one [`Analyzer`](crate::analyzer::Analyzer); readers get
/// a [`BuildSnapshot`](crate::snapshot::BuildSnapshot) instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildState {
    /// Overwritten on repeat
    pub started: Option<BuildStarted>,
    /// Overwritten on repeat
    pub finished: Option<BuildFinished>,
    /// Cumulative, overwritten on arrival
    pub metrics: Option<BuildMetrics>,
    /// Append-only, arrival order
    pub actions: Vec<Action>,
    /// Upsert by label
    pub tests: IndexMap<String, TestSummary>,
    /// Append-only
    pub problems: Vec<Problem>,
    /// Append-only
    pub failed_targets: Vec<FailedTarget>,
    /// Overwritten on arrival
    pub workspace_status: Option<WorkspaceStatus>,
    /// Insert-only by configuration id
    pub configurations: IndexMap<String, Configuration>,
    /// Overwritten on arrival
    pub options_parsed: Option<OptionsParsed>,
    /// Canonical variant only
    pub command_line: Option<StructuredCommandLine>,
    /// Raw patterns in arrival order
    pub requested_patterns: Vec<String>,
    /// Parsed form of `requested_patterns`
    pub pattern_set: PatternSet,
    /// Insert-only
    pub named_sets: NamedSetGraph,
    /// Append-only
    pub convenience_symlinks: Vec<ConvenienceSymlink>,
    /// Requested target label to its output file-set ids, insert-only
    pub top_level_outputs: IndexMap<String, Vec<String>>,
    /// Overwritten on arrival
    pub build_tool_logs: Option<BuildToolLogs>,
    /// `ERROR:` lines from progress output, bounded
    pub console_errors: Vec<String>,
    /// `WARNING:` lines from progress output, bounded
    pub console_warnings: Vec<String>,
    /// Console lines dropped past `MAX_CONSOLE_LINES`
    pub console_lines_dropped: u64,
    /// Anomalies absorbed during accumulation
    pub analysis_warnings: Vec<String>,
    /// Most recent progress block with counters or running actions
    pub last_progress: Option<ProgressInfo>,
    /// Events passed to the analyzer
    pub events_applied: u64,
    /// Events of a kind the analyzer does not model
    pub unknown_events: u64,
}

impl BuildState {
    /// Create a new empty state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a console error, respecting the bound
    pub fn push_console_error(&mut self, line: String) {
        if self.console_errors.len() < MAX_CONSOLE_LINES {
            self.console_errors.push(line);
        } else {
            self.console_lines_dropped += 1;
        }
    }

    /// Append a console warning, respecting the bound
    pub fn push_console_warning(&mut self, line: String) {
        if self.console_warnings.len() < MAX_CONSOLE_LINES {
            self.console_warnings.push(line);
        } else {
            self.console_lines_dropped += 1;
        }
    }

    /// Record an anomaly on the side channel
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%message, "Analysis warning");
        self.analysis_warnings.push(message);
    }

    /// Check if the stream has reached its build-finished record
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Number of failed actions
    #[must_use]
    pub fn failed_action_count(&self) -> usize {
        self.actions.iter().filter(|a| !a.success).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_creation() {
        let state = BuildState::new();
        assert!(!state.is_finished());
        assert!(state.actions.is_empty());
        assert_eq!(state.events_applied, 0);
    }

    #[test]
    fn test_console_bounds() {
        let mut state = BuildState::new();
        for i in 0..MAX_CONSOLE_LINES + 3 {
            state.push_console_error(format!("ERROR: {}", i));
        }
        state.push_console_warning("WARNING: w".into());

        assert_eq!(state.console_errors.len(), MAX_CONSOLE_LINES);
        assert_eq!(state.console_warnings.len(), 1);
        assert_eq!(state.console_lines_dropped, 3);
    }

    #[test]
    fn test_warn_side_channel() {
        let mut state = BuildState::new();
        state.warn("stderr missing");
        assert_eq!(state.analysis_warnings, vec!["stderr missing".to_string()]);
    }
}
