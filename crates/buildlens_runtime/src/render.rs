//! Live render modes and their output contract.

use crate::monitor::LiveView;
use buildlens_core::format_duration_ms;
use buildlens_log::event::{BuildEvent, EventPayload};
use buildlens_replay::BuildSnapshot;
use std::io;

/// Width of the dashboard progress bar in cells
pub const BAR_WIDTH: usize = 30;

/// One unit of terminal output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    /// Replace the previously drawn block with these lines
    Redraw(Vec<String>),
    /// Rewrite the current line in place
    Replace(String),
    /// Append a line below everything drawn so far
    Append(String),
}

/// Destination for emissions
pub trait EmissionSink {
    /// Write one emission
    ///
    /// # Errors
    ///
    /// Returns error if the underlying output fails
    fn emit(&mut self, emission: Emission) -> io::Result<()>;
}

/// Sink that keeps every emission, for tests and headless runs
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    /// Emissions in order
    pub emissions: Vec<Emission>,
}

impl CollectingSink {
    /// Create a new sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appended lines only
    pub fn appended(&self) -> impl Iterator<Item = &str> {
        self.emissions.iter().filter_map(|e| match e {
            Emission::Append(line) => Some(line.as_str()),
            _ => None,
        })
    }
}

impl EmissionSink for CollectingSink {
    fn emit(&mut self, emission: Emission) -> io::Result<()> {
        self.emissions.push(emission);
        Ok(())
    }
}

/// How a live session is drawn; chosen once per session
pub trait RenderMode: Send {
    /// Called after an event has been applied
    fn on_event(&mut self, _event: &BuildEvent, _view: &LiveView) -> Option<Emission> {
        None
    }

    /// Called on every tick
    fn on_tick(&mut self, _view: &LiveView) -> Option<Emission> {
        None
    }

    /// Called once when the session ends
    fn on_finish(&mut self, view: &LiveView, snapshot: &BuildSnapshot) -> Option<Emission>;
}

fn counters(view: &LiveView) -> Option<String> {
    let progress = view.progress()?;
    match (progress.completed, progress.total) {
        (Some(done), Some(total)) => Some(format!("[{} / {}]", done, total)),
        _ => None,
    }
}

fn bar(percent: f64) -> String {
    let filled = ((percent / 100.0) * BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(BAR_WIDTH);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

fn summary_line(view: &LiveView, snapshot: &BuildSnapshot) -> String {
    let outcome = match snapshot.succeeded() {
        Some(true) => "Build succeeded",
        Some(false) => "Build failed",
        None => "Build did not finish",
    };
    let duration = snapshot
        .total_duration_ms()
        .map_or_else(|| view.elapsed_text(), format_duration_ms);
    format!(
        "{} in {} ({} actions, {} failed, {} failed tests)",
        outcome,
        duration,
        snapshot.actions.len(),
        snapshot.failed_actions().count(),
        snapshot.failed_tests().count()
    )
}

/// Multi-line block redrawn on every tick
#[derive(Debug, Clone, Default)]
pub struct DashboardMode;

impl DashboardMode {
    fn lines(view: &LiveView) -> Vec<String> {
        let mut lines = Vec::new();
        let mut header = format!("{} {}", view.spinner(), view.elapsed_text());
        if let Some(command) = view.command() {
            header.push_str(&format!("  bazel {}", command));
        }
        if let Some(counters) = counters(view) {
            header.push_str(&format!("  {}", counters));
        }
        lines.push(header);

        if let Some(progress) = view.progress() {
            if let Some(percent) = progress.percent() {
                lines.push(format!("{} {:>5.1}%", bar(percent), percent));
            }
            if let Some(top) = &progress.top_line {
                lines.push(top.clone());
            }
            for action in &progress.running {
                let strategy = action
                    .strategy
                    .as_deref()
                    .map(|s| format!(" ({})", s))
                    .unwrap_or_default();
                lines.push(format!(
                    "  {:>4}s {}{}",
                    action.elapsed_secs, action.description, strategy
                ));
            }
        }

        lines.push(format!(
            "actions {}  failed {}  failed tests {}  problems {}",
            view.actions_completed(),
            view.actions_failed(),
            view.tests_failed(),
            view.problems()
        ));
        if !view.recent().is_empty() {
            lines.push("recent:".to_string());
            lines.extend(view.recent().iter().map(|entry| format!("  {}", entry)));
        }
        lines
    }
}

impl RenderMode for DashboardMode {
    fn on_tick(&mut self, view: &LiveView) -> Option<Emission> {
        Some(Emission::Redraw(Self::lines(view)))
    }

    fn on_finish(&mut self, view: &LiveView, snapshot: &BuildSnapshot) -> Option<Emission> {
        let mut lines = vec![summary_line(view, snapshot)];
        lines.extend(
            snapshot
                .failed_actions()
                .map(|a| format!("  ✗ {} {}", a.mnemonic, a.label)),
        );
        Some(Emission::Redraw(lines))
    }
}

/// Single status line rewritten on every tick
#[derive(Debug, Clone, Default)]
pub struct StatusLineMode;

impl RenderMode for StatusLineMode {
    fn on_tick(&mut self, view: &LiveView) -> Option<Emission> {
        let mut line = format!("{} {}", view.spinner(), view.elapsed_text());
        if let Some(counters) = counters(view) {
            line.push(' ');
            line.push_str(&counters);
        }
        if let Some(top) = view.progress().and_then(|p| p.top_line.as_deref()) {
            line.push(' ');
            line.push_str(top);
        }
        if view.actions_failed() > 0 {
            line.push_str(&format!(" ({} failed)", view.actions_failed()));
        }
        Some(Emission::Replace(line))
    }

    fn on_finish(&mut self, view: &LiveView, snapshot: &BuildSnapshot) -> Option<Emission> {
        Some(Emission::Replace(summary_line(view, snapshot)))
    }
}

/// One appended, token-prefixed line per significant event
#[derive(Debug, Clone, Default)]
pub struct LogLineMode;

impl LogLineMode {
    /// Line prefix for a build-started event
    pub const BUILD_STARTED: &'static str = "BUILD_STARTED";
    /// Line prefix for an action-completed event
    pub const ACTION_COMPLETED: &'static str = "ACTION_COMPLETED";
    /// Line prefix for aborted events and failed targets
    pub const PROBLEM: &'static str = "PROBLEM";
    /// Line prefix for a build-finished event
    pub const BUILD_FINISHED: &'static str = "BUILD_FINISHED";
}

impl RenderMode for LogLineMode {
    fn on_event(&mut self, event: &BuildEvent, view: &LiveView) -> Option<Emission> {
        let line = match &event.payload {
            EventPayload::BuildStarted(started) => format!(
                "{} command={} uuid={}",
                Self::BUILD_STARTED,
                started.command,
                started.uuid
            ),
            EventPayload::ActionCompleted(action) => format!(
                "{} {} {} {}{}",
                Self::ACTION_COMPLETED,
                if action.success { "ok" } else { "FAILED" },
                action.mnemonic,
                action.label,
                action
                    .exit_code
                    .filter(|code| *code != 0)
                    .map(|code| format!(" exit={}", code))
                    .unwrap_or_default()
            ),
            EventPayload::Aborted(aborted) => format!(
                "{} {} {}{}",
                Self::PROBLEM,
                aborted.reason,
                aborted.label.as_deref().unwrap_or(aborted.subject.as_str()),
                if aborted.description.is_empty() {
                    String::new()
                } else {
                    format!(": {}", aborted.description)
                }
            ),
            EventPayload::TargetCompleted(target) if !target.success => {
                format!("{} TARGET_FAILED {}", Self::PROBLEM, target.label)
            }
            EventPayload::BuildFinished(finished) => format!(
                "{} {} exit={} elapsed={}",
                Self::BUILD_FINISHED,
                if finished.succeeded() { "success" } else { "failure" },
                finished.exit_code.as_ref().map_or(0, |c| c.code),
                view.elapsed_text()
            ),
            _ => return None,
        };
        Some(Emission::Append(line))
    }

    fn on_finish(&mut self, _view: &LiveView, _snapshot: &BuildSnapshot) -> Option<Emission> {
        None
    }
}
