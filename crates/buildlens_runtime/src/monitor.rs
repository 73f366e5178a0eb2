//! Live view of a running build.
//!
//! Holds only what renderers draw between events: recent activity, the
//! latest progress block, counters and the spinner.

use crate::ingestor::LiveState;
use buildlens_core::format_duration_ms;
use buildlens_log::event::{BuildEvent, EventPayload};
use buildlens_replay::ProgressInfo;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Default capacity of the recent-activity ring
pub const DEFAULT_RECENT_CAPACITY: usize = 5;

/// Spinner animation frames
pub const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Bounded ring of activity lines, deduplicated against the newest entry
#[derive(Debug, Clone)]
pub struct ActivityRing {
    entries: VecDeque<String>,
    capacity: usize,
}

impl ActivityRing {
    /// Create a new ring
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push an entry; returns false when it repeats the newest one
    pub fn push(&mut self, entry: String) -> bool {
        if self.capacity == 0 || self.entries.back() == Some(&entry) {
            return false;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        true
    }

    /// Entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// State renderers read on every tick
#[derive(Debug, Clone)]
pub struct LiveView {
    state: LiveState,
    recent: ActivityRing,
    progress: Option<ProgressInfo>,
    spinner: usize,
    running_since: Option<Instant>,
    frozen_elapsed: Option<Duration>,
    command: Option<String>,
    actions_completed: u64,
    actions_failed: u64,
    tests_failed: u64,
    problems: u64,
    succeeded: Option<bool>,
}

impl LiveView {
    /// Create a new view
    #[must_use]
    pub fn new(recent_capacity: usize) -> Self {
        Self {
            state: LiveState::WaitingForSource,
            recent: ActivityRing::new(recent_capacity),
            progress: None,
            spinner: 0,
            running_since: None,
            frozen_elapsed: None,
            command: None,
            actions_completed: 0,
            actions_failed: 0,
            tests_failed: 0,
            problems: 0,
            succeeded: None,
        }
    }

    /// Move to a new lifecycle state
    pub fn set_state(&mut self, state: LiveState) {
        match state {
            LiveState::Running if self.running_since.is_none() => {
                self.running_since = Some(Instant::now());
            }
            LiveState::Finished => self.frozen_elapsed = Some(self.elapsed()),
            _ => {}
        }
        self.state = state;
    }

    /// Fold an applied event into the view
    pub fn observe(&mut self, event: &BuildEvent) {
        match &event.payload {
            EventPayload::BuildStarted(started) => {
                self.command = Some(started.command.clone()).filter(|c| !c.is_empty());
                self.recent.push(format!(
                    "Build started{}",
                    self.command
                        .as_deref()
                        .map(|c| format!(": {}", c))
                        .unwrap_or_default()
                ));
            }
            EventPayload::ActionCompleted(action) => {
                self.actions_completed += 1;
                if !action.success {
                    self.actions_failed += 1;
                    self.recent
                        .push(format!("✗ {} {}", action.mnemonic, action.label));
                }
            }
            EventPayload::TestSummary(summary) if summary.overall_status.is_failure() => {
                self.tests_failed += 1;
                self.recent.push(format!("✗ test {}", summary.label));
            }
            EventPayload::TargetCompleted(target) if !target.success => {
                self.recent.push(format!("✗ target {}", target.label));
            }
            EventPayload::Aborted(aborted) => {
                self.problems += 1;
                self.recent.push(match &aborted.label {
                    Some(label) => format!("! {} {}", aborted.reason, label),
                    None => format!("! {}", aborted.reason),
                });
            }
            EventPayload::BuildFinished(finished) => {
                self.succeeded = Some(finished.succeeded());
                self.recent.push(if finished.succeeded() {
                    "Build succeeded".to_string()
                } else {
                    "Build failed".to_string()
                });
            }
            _ => {}
        }
    }

    /// Replace the latest progress block
    pub fn set_progress(&mut self, progress: Option<ProgressInfo>) {
        if progress.is_some() {
            self.progress = progress;
        }
    }

    /// Advance the spinner; frozen once finished
    pub fn tick(&mut self) {
        if self.state != LiveState::Finished {
            self.spinner = (self.spinner + 1) % SPINNER.len();
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> LiveState {
        self.state
    }

    /// Recent activity, oldest first
    #[must_use]
    pub fn recent(&self) -> &ActivityRing {
        &self.recent
    }

    /// Latest progress block
    #[must_use]
    pub fn progress(&self) -> Option<&ProgressInfo> {
        self.progress.as_ref()
    }

    /// Current spinner frame
    #[must_use]
    pub fn spinner(&self) -> &'static str {
        SPINNER[self.spinner]
    }

    /// Time since the first line arrived, frozen at finish
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.frozen_elapsed
            .or_else(|| self.running_since.map(|since| since.elapsed()))
            .unwrap_or_default()
    }

    /// Elapsed time in display form
    #[must_use]
    pub fn elapsed_text(&self) -> String {
        format_duration_ms(self.elapsed().as_millis() as u64)
    }

    /// Command from the build-started event
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// Completed action count
    #[must_use]
    pub fn actions_completed(&self) -> u64 {
        self.actions_completed
    }

    /// Failed action count
    #[must_use]
    pub fn actions_failed(&self) -> u64 {
        self.actions_failed
    }

    /// Failed test count
    #[must_use]
    pub fn tests_failed(&self) -> u64 {
        self.tests_failed
    }

    /// Aborted event count
    #[must_use]
    pub fn problems(&self) -> u64 {
        self.problems
    }

    /// Build outcome once finished
    #[must_use]
    pub fn succeeded(&self) -> Option<bool> {
        self.succeeded
    }
}

impl Default for LiveView {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_CAPACITY)
    }
}
