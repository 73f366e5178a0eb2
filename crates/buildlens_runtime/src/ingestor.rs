//! Live ingestion of a line-delimited event file that is still being written.

use crate::monitor::{LiveView, DEFAULT_RECENT_CAPACITY};
use crate::render::{EmissionSink, RenderMode};
use crate::tail::{TailStats, Tailer};
use buildlens_core::AnalyzerConfig;
use buildlens_log::event::{BuildEvent, EventPayload};
use buildlens_log::{json, DecodeError};
use buildlens_replay::{Analyzer, BuildSnapshot};
use std::path::Path;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiveState {
    /// No line has arrived yet
    WaitingForSource,
    /// Lines are being applied
    Running,
    /// Terminal event applied; nothing more is processed
    Finished,
}

impl LiveState {
    /// Get the state name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WaitingForSource => "waiting",
            Self::Running => "running",
            Self::Finished => "finished",
        }
    }
}

impl std::fmt::Display for LiveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live session configuration
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Render tick period
    pub tick_interval: Duration,
    /// Retry period while the file is missing or at its end
    pub poll_interval: Duration,
    /// Recent-activity ring size
    pub recent_capacity: usize,
    /// Bounded line channel size between tailer and session
    pub channel_capacity: usize,
    /// Analyzer settings
    pub analyzer: AnalyzerConfig,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            poll_interval: Duration::from_millis(200),
            recent_capacity: DEFAULT_RECENT_CAPACITY,
            channel_capacity: 1024,
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl LiveConfig {
    /// Create a new config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tick interval
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the poll interval
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the analyzer config
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: AnalyzerConfig) -> Self {
        self.analyzer = analyzer;
        self
    }
}

/// Live session errors
#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    /// Output sink failed
    #[error("Render output failed: {0}")]
    Sink(#[from] std::io::Error),

    /// Tailer task panicked or was aborted
    #[error("Tailer task failed: {0}")]
    Tailer(String),
}

/// Frozen result of a live session
#[derive(Debug, Clone)]
pub struct LiveOutcome {
    /// State when the session ended
    pub state: LiveState,
    /// Accumulated build state
    pub snapshot: BuildSnapshot,
    /// Stopped by the cancellation token
    pub cancelled: bool,
    /// Lines received
    pub lines: u64,
    /// Lines that could not be parsed
    pub skipped: u64,
    /// Tailer counters
    pub tail: TailStats,
    /// Source read failure, if the tailer stopped on one
    pub source_error: Option<String>,
}

/// Line-at-a-time state machine, independent of any runtime
pub struct LiveSession {
    analyzer: Analyzer,
    view: LiveView,
    lines: u64,
    skipped: u64,
}

impl LiveSession {
    /// Create a new session
    #[must_use]
    pub fn new(config: &LiveConfig) -> Self {
        Self {
            analyzer: Analyzer::new(config.analyzer.clone()),
            view: LiveView::new(config.recent_capacity),
            lines: 0,
            skipped: 0,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> LiveState {
        self.view.state()
    }

    /// View for renderers
    #[must_use]
    pub fn view(&self) -> &LiveView {
        &self.view
    }

    /// Detached build state
    #[must_use]
    pub fn snapshot(&self) -> BuildSnapshot {
        let mut snapshot = self.analyzer.snapshot();
        if self.skipped > 0 {
            snapshot
                .analysis_warnings
                .push(format!("Skipped {} malformed records", self.skipped));
        }
        snapshot
    }

    /// Lines received so far
    #[must_use]
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Lines skipped as malformed
    #[must_use]
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Apply one line without its terminator; returns the event when one
    /// was applied.
    ///
    /// Lines that are not UTF-8 or not valid JSON are counted as skipped.
    /// The session leaves `WaitingForSource` on the first line that decodes.
    pub fn ingest_line(&mut self, line: impl AsRef<[u8]>) -> Option<BuildEvent> {
        if self.state() == LiveState::Finished {
            tracing::trace!("Ignoring line after finish");
            return None;
        }
        self.lines += 1;

        let parsed = match std::str::from_utf8(line.as_ref()) {
            Ok(text) => json::parse_line(text),
            Err(e) => Err(DecodeError::MalformedLine {
                line: self.lines,
                reason: e.to_string(),
            }),
        };
        let event = match parsed {
            Ok(Some(event)) => event,
            Ok(None) => return None,
            Err(e) => {
                self.skipped += 1;
                tracing::warn!(line = self.lines, error = %e, "Skipping malformed live record");
                return None;
            }
        };

        if self.state() == LiveState::WaitingForSource {
            tracing::info!("First event received");
            self.view.set_state(LiveState::Running);
        }
        self.analyzer.apply(&event);
        self.view.observe(&event);
        if matches!(event.payload, EventPayload::Progress(_)) {
            self.view
                .set_progress(self.analyzer.state().last_progress.clone());
        }
        if event.is_terminus() {
            tracing::info!(lines = self.lines, "Build finished");
            self.view.set_state(LiveState::Finished);
        }
        Some(event)
    }

    /// Advance render-only state
    pub fn tick(&mut self) {
        self.view.tick();
    }
}

/// Drives a [`LiveSession`] from a tailed file
#[derive(Debug, Clone, Default)]
pub struct LiveIngestor {
    config: LiveConfig,
}

impl LiveIngestor {
    /// Create a new ingestor
    #[must_use]
    pub fn new(config: LiveConfig) -> Self {
        Self { config }
    }

    /// Get the config
    #[must_use]
    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    /// Follow `path` until the build finishes or `cancel` fires
    ///
    /// # Errors
    ///
    /// Returns error if the sink fails or the tailer task cannot be joined
    pub async fn run<M, S>(
        &self,
        path: &Path,
        mode: &mut M,
        sink: &mut S,
        cancel: CancellationToken,
    ) -> Result<LiveOutcome, LiveError>
    where
        M: RenderMode + ?Sized,
        S: EmissionSink + ?Sized,
    {
        let (tx, mut rx) = tokio::sync::mpsc::channel(self.config.channel_capacity.max(1));
        let tail_cancel = cancel.child_token();
        let tailer = tokio::spawn(
            Tailer::new(path, self.config.poll_interval).run(tx, tail_cancel.clone()),
        );

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut session = LiveSession::new(&self.config);
        let mut cancelled = false;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::info!(state = %session.state(), "Live session cancelled");
                    cancelled = true;
                    break;
                }
                line = rx.recv() => {
                    let Some(line) = line else { break };
                    if let Some(event) = session.ingest_line(&line) {
                        if let Some(emission) = mode.on_event(&event, session.view()) {
                            sink.emit(emission)?;
                        }
                    }
                    if session.state() == LiveState::Finished {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    session.tick();
                    if let Some(emission) = mode.on_tick(session.view()) {
                        sink.emit(emission)?;
                    }
                }
            }
        }

        tail_cancel.cancel();
        drop(rx);
        let (tail, source_error) = match tailer.await {
            Ok(Ok(stats)) => (stats, None),
            Ok(Err(e)) => {
                tracing::error!(path = %path.display(), error = %e, "Event file unreadable");
                (TailStats::default(), Some(e.to_string()))
            }
            Err(e) => return Err(LiveError::Tailer(e.to_string())),
        };

        let snapshot = session.snapshot();
        if let Some(emission) = mode.on_finish(session.view(), &snapshot) {
            sink.emit(emission)?;
        }

        Ok(LiveOutcome {
            state: session.state(),
            snapshot,
            cancelled,
            lines: session.lines(),
            skipped: session.skipped(),
            tail,
            source_error,
        })
    }
}
