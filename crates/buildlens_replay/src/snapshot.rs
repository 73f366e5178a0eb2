//! Read-only view of an analysis session.

use crate::fileset::{FileSetResolver, OutputFile};
use crate::progress::ProgressInfo;
use crate::state::{Action, BuildState, FailedTarget, Problem};
use buildlens_core::DetailLevel;
use buildlens_log::event::{
    BuildFinished, BuildMetrics, BuildStarted, BuildToolLogs, Configuration,
    ConvenienceSymlink, OptionsParsed, StructuredCommandLine, TestSummary, WorkspaceStatus,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Snapshot validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    /// Stream ended without the records a report needs
    #[error("Incomplete stream: {}", describe_missing(.missing_started, .missing_finished))]
    Incomplete {
        /// No build-started record
        missing_started: bool,
        /// No build-finished record
        missing_finished: bool,
    },
}

fn describe_missing(started: &bool, finished: &bool) -> &'static str {
    match (*started, *finished) {
        (true, true) => "no build-started or build-finished event",
        (true, false) => "no build-started event",
        _ => "no build-finished event",
    }
}

/// Everything a renderer or report needs, detached from the analyzer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildSnapshot {
    /// Build-started payload
    pub started: Option<BuildStarted>,
    /// Build-finished payload
    pub finished: Option<BuildFinished>,
    /// Build metrics, usually after the finish record
    pub metrics: Option<BuildMetrics>,
    /// Completed actions kept under the detail policy
    pub actions: Vec<Action>,
    /// Per-target test summaries
    pub tests: Vec<TestSummary>,
    /// Aborted events in arrival order
    pub problems: Vec<Problem>,
    /// Targets that completed unsuccessfully
    pub failed_targets: Vec<FailedTarget>,
    /// Workspace status key/value pairs
    pub workspace_status: Option<WorkspaceStatus>,
    /// Configuration id to its details
    pub configurations: IndexMap<String, Configuration>,
    /// Parsed option lists
    pub options_parsed: Option<OptionsParsed>,
    /// Canonical structured command line
    pub command_line: Option<StructuredCommandLine>,
    /// Target patterns as requested
    pub requested_patterns: Vec<String>,
    /// Requested target label to its resolved, deduplicated outputs
    pub outputs: IndexMap<String, Vec<OutputFile>>,
    /// Convenience symlinks the tool manages
    pub convenience_symlinks: Vec<ConvenienceSymlink>,
    /// Tool logs attached at the end of the stream
    pub build_tool_logs: Option<BuildToolLogs>,
    /// `ERROR:` lines from progress output
    pub console_errors: Vec<String>,
    /// `WARNING:` lines from progress output
    pub console_warnings: Vec<String>,
    /// Problems found while analyzing the stream itself
    pub analysis_warnings: Vec<String>,
    /// Most recent parsed progress payload
    pub last_progress: Option<ProgressInfo>,
    /// Detail policy the actions were captured under
    pub detail: DetailLevel,
    /// Records applied to the analyzer
    pub events_applied: u64,
    /// Records with an unrecognized kind
    pub unknown_events: u64,
}

impl BuildSnapshot {
    /// Build a snapshot from state, resolving target outputs
    #[must_use]
    pub fn from_state(state: &BuildState, detail: DetailLevel) -> Self {
        let resolver = FileSetResolver::new(&state.named_sets);
        let outputs = state
            .top_level_outputs
            .iter()
            .map(|(label, ids)| {
                let files = resolver.resolve_unique(ids.iter().map(String::as_str));
                (label.clone(), files)
            })
            .collect();

        Self {
            started: state.started.clone(),
            finished: state.finished.clone(),
            metrics: state.metrics.clone(),
            actions: state.actions.clone(),
            tests: state.tests.values().cloned().collect(),
            problems: state.problems.clone(),
            failed_targets: state.failed_targets.clone(),
            workspace_status: state.workspace_status.clone(),
            configurations: state.configurations.clone(),
            options_parsed: state.options_parsed.clone(),
            command_line: state.command_line.clone(),
            requested_patterns: state.requested_patterns.clone(),
            outputs,
            convenience_symlinks: state.convenience_symlinks.clone(),
            build_tool_logs: state.build_tool_logs.clone(),
            console_errors: state.console_errors.clone(),
            console_warnings: state.console_warnings.clone(),
            analysis_warnings: state.analysis_warnings.clone(),
            last_progress: state.last_progress.clone(),
            detail,
            events_applied: state.events_applied,
            unknown_events: state.unknown_events,
        }
    }

    /// Wall-clock build time from the started and finished timestamps
    #[must_use]
    pub fn total_duration_ms(&self) -> Option<u64> {
        let start = self.started.as_ref()?.start_time?;
        let finish = self.finished.as_ref()?.finish_time?;
        Some(finish.millis_since(&start))
    }

    /// Build outcome, once finished
    #[must_use]
    pub fn succeeded(&self) -> Option<bool> {
        self.finished.as_ref().map(BuildFinished::succeeded)
    }

    /// Failed actions in arrival order
    pub fn failed_actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter().filter(|a| !a.success)
    }

    /// Tests whose status counts as a failure
    pub fn failed_tests(&self) -> impl Iterator<Item = &TestSummary> {
        self.tests.iter().filter(|t| t.overall_status.is_failure())
    }

    /// Check the snapshot has both boundary records.
    ///
    /// # Errors
    ///
    /// Returns error if build-started or build-finished is missing
    pub fn ensure_complete(&self) -> Result<(), SnapshotError> {
        let missing_started = self.started.is_none();
        let missing_finished = self.finished.is_none();
        if missing_started || missing_finished {
            return Err(SnapshotError::Incomplete {
                missing_started,
                missing_finished,
            });
        }
        Ok(())
    }
}
