//! Event-by-event accumulation into a [`BuildState`].
//!
//! The analyzer never fails: anomalies are logged, counted, or recorded as
//! analysis warnings, and the stream keeps flowing.

use crate::capture::{self, PLACEHOLDER_CLEANED_UP, PLACEHOLDER_MISSING};
use crate::progress::{self, parse_progress_text};
use crate::snapshot::BuildSnapshot;
use crate::state::{Action, BuildState, FailedTarget, Problem};
use buildlens_core::{normalize_label, AnalyzerConfig};
use buildlens_log::event::{
    ActionCompleted, Aborted, BuildEvent, EventPayload, Progress, TargetCompleted,
};
use indexmap::IndexMap;

/// Entries kept in each correlation cache before the oldest is evicted
pub const MAX_PENDING: usize = 4096;

/// Output groups whose names start with this are internal to the build tool
const HIDDEN_GROUP_PREFIX: char = '_';

/// Stateful consumer of canonical build events
#[derive(Debug, Clone)]
pub struct Analyzer {
    config: AnalyzerConfig,
    state: BuildState,
    /// Output stem to strategy seen in progress output
    pending_strategies: IndexMap<String, String>,
    /// Label to error excerpt seen in progress output
    pending_errors: IndexMap<String, String>,
}

impl Analyzer {
    /// Create a new analyzer
    #[must_use]
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            state: BuildState::new(),
            pending_strategies: IndexMap::new(),
            pending_errors: IndexMap::new(),
        }
    }

    /// Get the config
    #[must_use]
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Get the accumulated state
    #[must_use]
    pub fn state(&self) -> &BuildState {
        &self.state
    }

    /// Consume and return the accumulated state
    #[must_use]
    pub fn into_state(self) -> BuildState {
        self.state
    }

    /// Detached view of the current state
    #[must_use]
    pub fn snapshot(&self) -> BuildSnapshot {
        BuildSnapshot::from_state(&self.state, self.config.detail)
    }

    /// Record an anomaly found outside event dispatch
    pub fn warn(&mut self, message: impl Into<String>) {
        self.state.warn(message);
    }

    /// Fold one event into the state
    pub fn apply(&mut self, event: &BuildEvent) {
        self.state.events_applied += 1;

        match &event.payload {
            EventPayload::BuildStarted(started) => {
                if self.state.started.is_some() {
                    tracing::debug!("Repeated build-started event, overwriting");
                }
                self.state.started = Some(started.clone());
            }
            EventPayload::BuildFinished(finished) => {
                if self.state.finished.is_some() {
                    tracing::debug!("Repeated build-finished event, overwriting");
                }
                self.state.finished = Some(finished.clone());
            }
            EventPayload::ActionCompleted(action) => self.apply_action(action),
            EventPayload::TargetCompleted(target) => self.apply_target(target),
            EventPayload::TestSummary(summary) => {
                let label = normalize_label(&summary.label);
                if self.state.tests.insert(label, summary.clone()).is_some() {
                    tracing::debug!(label = %summary.label, "Test summary replaced");
                }
            }
            EventPayload::Aborted(aborted) => self.apply_aborted(aborted),
            EventPayload::WorkspaceStatus(status) => {
                self.state.workspace_status = Some(status.clone());
            }
            EventPayload::Configuration(configuration) => {
                self.state
                    .configurations
                    .entry(configuration.id.clone())
                    .or_insert_with(|| configuration.clone());
            }
            EventPayload::BuildMetrics(metrics) => {
                self.state.metrics = Some(metrics.clone());
            }
            EventPayload::BuildToolLogs(logs) => {
                self.state.build_tool_logs = Some(logs.clone());
            }
            EventPayload::OptionsParsed(options) => {
                self.state.options_parsed = Some(options.clone());
            }
            EventPayload::StructuredCommandLine(command_line) => {
                if command_line.is_canonical() {
                    self.state.command_line = Some(command_line.clone());
                } else {
                    tracing::trace!(
                        label = %command_line.command_line_label,
                        "Skipping non-canonical command line"
                    );
                }
            }
            EventPayload::Pattern(expanded) => {
                for raw in &expanded.patterns {
                    self.state.requested_patterns.push(raw.clone());
                    if let Err(e) = self.state.pattern_set.push(raw) {
                        self.state.warn(format!("Ignoring pattern {:?}: {}", raw, e));
                    }
                }
            }
            EventPayload::NamedSet(set) => {
                self.state.named_sets.insert(set.clone());
            }
            EventPayload::ConvenienceSymlinks(symlinks) => {
                self.state
                    .convenience_symlinks
                    .extend(symlinks.symlinks.iter().cloned());
            }
            EventPayload::Progress(progress) => self.apply_progress(progress),
            EventPayload::Unknown(name) => {
                self.state.unknown_events += 1;
                tracing::trace!(kind = %name, "Ignoring unmodelled event");
            }
        }
    }

    fn apply_action(&mut self, completed: &ActionCompleted) {
        let duration_ms = completed
            .wall_time_ms
            .or_else(|| match (completed.start_time, completed.end_time) {
                (Some(start), Some(end)) => Some(end.millis_since(&start)),
                _ => None,
            })
            .unwrap_or(0);

        let strategy = self
            .pending_strategies
            .shift_remove(&progress::stem(&completed.primary_output));

        let mut action = Action {
            success: completed.success,
            mnemonic: completed.mnemonic.clone(),
            label: normalize_label(&completed.label),
            primary_output: completed.primary_output.clone(),
            configuration: completed.configuration.clone(),
            exit_code: completed.exit_code,
            command_line: None,
            stderr: None,
            strategy,
            duration_ms,
            start_time: completed.start_time,
        };

        if self.config.detail.captures(completed.success) {
            if !completed.command_line.is_empty() {
                action.command_line = Some(completed.command_line.clone());
            }
            action.stderr = self.capture_stderr(&action.label, completed);
        }

        tracing::debug!(
            label = %action.label,
            mnemonic = %action.mnemonic,
            success = action.success,
            duration_ms,
            "Action completed"
        );
        self.state.actions.push(action);
    }

    fn capture_stderr(&mut self, label: &str, completed: &ActionCompleted) -> Option<String> {
        let max_bytes = self.config.max_capture_bytes;
        if !completed.success {
            if let Some(excerpt) = self.pending_errors.shift_remove(label) {
                return Some(capture::cap_text(&excerpt, max_bytes));
            }
        }

        let file = completed.stderr.as_ref()?;
        match capture::read_side_file(file, max_bytes) {
            Ok(text) => Some(text),
            Err(e) if completed.success => {
                tracing::debug!(%label, error = %e, "Stderr of successful action unavailable");
                Some(PLACEHOLDER_CLEANED_UP.to_string())
            }
            Err(e) => {
                self.state
                    .warn(format!("Stderr for failed action {} unavailable: {}", label, e));
                Some(PLACEHOLDER_MISSING.to_string())
            }
        }
    }

    fn apply_target(&mut self, target: &TargetCompleted) {
        let label = normalize_label(&target.label);

        if !target.success {
            self.state.failed_targets.push(FailedTarget {
                label,
                configuration: target.configuration.clone(),
                message: target.failure_message.clone(),
            });
            return;
        }

        if !self.state.pattern_set.matches(&label) {
            return;
        }

        let mut ids: Vec<String> = Vec::new();
        for group in &target.output_groups {
            if group.name.starts_with(HIDDEN_GROUP_PREFIX) {
                continue;
            }
            for id in &group.file_sets {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }

        if self.state.top_level_outputs.contains_key(&label) {
            tracing::debug!(%label, "Outputs already recorded, keeping first");
        } else {
            self.state.top_level_outputs.insert(label, ids);
        }
    }

    fn apply_aborted(&mut self, aborted: &Aborted) {
        tracing::debug!(
            reason = %aborted.reason,
            subject = %aborted.subject,
            "Event aborted"
        );
        self.state.problems.push(Problem {
            reason: aborted.reason.clone(),
            description: aborted.description.clone(),
            subject: aborted.subject,
            label: aborted.label.as_deref().map(normalize_label),
        });
    }

    fn apply_progress(&mut self, progress: &Progress) {
        for text in [&progress.stderr, &progress.stdout] {
            if text.is_empty() {
                continue;
            }
            let info = parse_progress_text(text);

            for (stem, strategy) in &info.strategies {
                remember(&mut self.pending_strategies, stem.clone(), strategy.clone());
            }
            for (label, excerpt) in &info.label_errors {
                self.correlate_error(label, excerpt);
            }
            for line in &info.errors {
                self.state.push_console_error(line.clone());
            }
            for line in &info.warnings {
                self.state.push_console_warning(line.clone());
            }
            if info.has_status() {
                self.state.last_progress = Some(info);
            }
        }
    }

    /// Attach to an already-recorded failed action of the label, or buffer
    fn correlate_error(&mut self, label: &str, excerpt: &str) {
        let max_bytes = self.config.max_capture_bytes;
        let detail = self.config.detail;

        let waiting = self.state.actions.iter_mut().rev().find(|a| {
            a.label == label && !a.success && a.stderr.is_none() && detail.captures(false)
        });
        match waiting {
            Some(action) => action.stderr = Some(capture::cap_text(excerpt, max_bytes)),
            None => remember(&mut self.pending_errors, label.to_string(), excerpt.to_string()),
        }
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

fn remember(cache: &mut IndexMap<String, String>, key: String, value: String) {
    cache.insert(key, value);
    while cache.len() > MAX_PENDING {
        cache.shift_remove_index(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildlens_core::{DetailLevel, Timestamp};
    use buildlens_log::event::{
        BuildFinished, BuildStarted, Configuration, EventKind, File, OutputGroup,
        PatternExpanded, StructuredCommandLine, TestStatus, TestSummary,
    };
    use std::io::Write;

    fn ev(payload: EventPayload) -> BuildEvent {
        BuildEvent::new(payload)
    }

    fn action(label: &str, output: &str, success: bool) -> ActionCompleted {
        ActionCompleted {
            label: label.into(),
            primary_output: output.into(),
            mnemonic: "CppCompile".into(),
            success,
            exit_code: Some(if success { 0 } else { 1 }),
            command_line: vec!["gcc".into(), "-c".into()],
            ..ActionCompleted::default()
        }
    }

    fn progress(stderr: &str) -> EventPayload {
        EventPayload::Progress(Progress {
            stderr: stderr.into(),
            ..Progress::default()
        })
    }

    fn analyzer(detail: DetailLevel) -> Analyzer {
        Analyzer::new(AnalyzerConfig::new().with_detail(detail))
    }

    #[test]
    fn test_started_finished_scenario() {
        let mut analyzer = Analyzer::default();
        analyzer.apply(&ev(EventPayload::BuildStarted(BuildStarted {
            start_time: Some(Timestamp::from_millis(0)),
            ..BuildStarted::default()
        })));
        let mut built = action("//app:bin", "app/bin", true);
        built.start_time = Some(Timestamp::from_millis(100));
        built.wall_time_ms = Some(500);
        analyzer.apply(&ev(EventPayload::ActionCompleted(built)));
        analyzer.apply(&ev(EventPayload::BuildFinished(BuildFinished {
            overall_success: true,
            finish_time: Some(Timestamp::from_millis(600)),
            ..BuildFinished::default()
        })));

        let snapshot = analyzer.snapshot();
        assert!(snapshot.ensure_complete().is_ok());
        assert_eq!(snapshot.actions.len(), 1);
        assert_eq!(snapshot.actions[0].duration_ms, 500);
        assert_eq!(snapshot.total_duration_ms(), Some(600));
        assert_eq!(snapshot.succeeded(), Some(true));
        assert_eq!(snapshot.events_applied, 3);
    }

    #[test]
    fn test_action_duration_sources() {
        let mut analyzer = Analyzer::default();

        let mut timed = action("//a:a", "a.o", true);
        timed.start_time = Some(Timestamp::from_millis(1_000));
        timed.end_time = Some(Timestamp::from_millis(1_250));
        analyzer.apply(&ev(EventPayload::ActionCompleted(timed.clone())));

        timed.wall_time_ms = Some(90);
        analyzer.apply(&ev(EventPayload::ActionCompleted(timed)));

        analyzer.apply(&ev(EventPayload::ActionCompleted(action("//b:b", "b.o", true))));

        let durations: Vec<u64> = analyzer.state().actions.iter().map(|a| a.duration_ms).collect();
        assert_eq!(durations, vec![250, 90, 0]);
    }

    #[test]
    fn test_detail_policy() {
        for (detail, captured) in [
            (DetailLevel::None, [false, false]),
            (DetailLevel::Failed, [false, true]),
            (DetailLevel::All, [true, true]),
        ] {
            let mut analyzer = analyzer(detail);
            analyzer.apply(&ev(EventPayload::ActionCompleted(action("//ok:ok", "ok.o", true))));
            analyzer.apply(&ev(EventPayload::ActionCompleted(action("//bad:bad", "bad.o", false))));

            let actions = &analyzer.state().actions;
            assert_eq!(actions[0].command_line.is_some(), captured[0], "{}", detail);
            assert_eq!(actions[1].command_line.is_some(), captured[1], "{}", detail);
        }
    }

    #[test]
    fn test_stderr_side_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"foo.cc:3: error: nope\n").unwrap();

        let mut failed = action("//app:foo", "foo.o", false);
        failed.stderr = Some(File::named("stderr").with_uri(tmp.path().display().to_string()));

        let mut analyzer = analyzer(DetailLevel::Failed);
        analyzer.apply(&ev(EventPayload::ActionCompleted(failed)));

        assert_eq!(
            analyzer.state().actions[0].stderr.as_deref(),
            Some("foo.cc:3: error: nope\n")
        );
        assert!(analyzer.state().analysis_warnings.is_empty());
    }

    #[test]
    fn test_missing_side_file_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let gone = File::named("stderr").with_uri(dir.path().join("gone").display().to_string());

        let mut ok = action("//ok:ok", "ok.o", true);
        ok.stderr = Some(gone.clone());
        let mut bad = action("//bad:bad", "bad.o", false);
        bad.stderr = Some(gone);

        let mut analyzer = analyzer(DetailLevel::All);
        analyzer.apply(&ev(EventPayload::ActionCompleted(ok)));
        analyzer.apply(&ev(EventPayload::ActionCompleted(bad)));

        let state = analyzer.state();
        assert_eq!(state.actions[0].stderr.as_deref(), Some(PLACEHOLDER_CLEANED_UP));
        assert_eq!(state.actions[1].stderr.as_deref(), Some(PLACEHOLDER_MISSING));
        assert_eq!(state.analysis_warnings.len(), 1);
        assert!(state.analysis_warnings[0].contains("//bad:bad"));
    }

    #[test]
    fn test_strategy_attached_and_consumed() {
        let mut analyzer = Analyzer::default();
        analyzer.apply(&ev(progress("[1 / 3] Compiling app/foo.cc; 2s linux-sandbox\n")));
        analyzer.apply(&ev(EventPayload::ActionCompleted(action(
            "//app:foo",
            "bazel-out/k8-fastbuild/bin/app/_objs/foo/foo.pic.o",
            true,
        ))));
        analyzer.apply(&ev(EventPayload::ActionCompleted(action("//app:foo2", "x/foo.o", true))));

        let actions = &analyzer.state().actions;
        assert_eq!(actions[0].strategy.as_deref(), Some("linux-sandbox"));
        assert_eq!(actions[1].strategy, None);
        assert_eq!(
            analyzer.state().last_progress.as_ref().and_then(|p| p.total),
            Some(3)
        );
    }

    #[test]
    fn test_progress_error_before_action() {
        let mut analyzer = analyzer(DetailLevel::Failed);
        analyzer.apply(&ev(progress(
            "ERROR: /ws/app/BUILD:1:1: Compiling app/foo.cc failed (from target //app:foo)\nfoo.cc:1: error: boom\n",
        )));
        analyzer.apply(&ev(EventPayload::ActionCompleted(action("//app:foo", "foo.o", false))));

        let state = analyzer.state();
        let stderr = state.actions[0].stderr.as_deref().unwrap();
        assert!(stderr.contains("error: boom"));
        assert_eq!(state.console_errors.len(), 1);
    }

    #[test]
    fn test_buffered_error_skips_successful_action() {
        let mut analyzer = analyzer(DetailLevel::All);
        analyzer.apply(&ev(progress(
            "ERROR: compile failed (from target //app:foo)\nfoo.cc:1: error: boom\n",
        )));
        analyzer.apply(&ev(EventPayload::ActionCompleted(action("//app:foo", "gen.h", true))));
        analyzer.apply(&ev(EventPayload::ActionCompleted(action("//app:foo", "foo.o", false))));

        let actions = &analyzer.state().actions;
        assert_eq!(actions[0].stderr, None);
        assert!(actions[1].stderr.as_deref().unwrap().contains("error: boom"));
    }

    #[test]
    fn test_progress_error_after_action() {
        let mut analyzer = analyzer(DetailLevel::Failed);
        analyzer.apply(&ev(EventPayload::ActionCompleted(action("//app:foo", "foo.o", false))));
        assert_eq!(analyzer.state().actions[0].stderr, None);

        analyzer.apply(&ev(progress(
            "ERROR: compile failed (from target //app:foo)\nfoo.cc:1: error: late\n",
        )));
        let stderr = analyzer.state().actions[0].stderr.as_deref().unwrap();
        assert!(stderr.contains("late"));
    }

    #[test]
    fn test_test_summary_upsert_idempotent() {
        let summary = TestSummary {
            label: "//t:unit".into(),
            overall_status: TestStatus::Failed,
            ..TestSummary::default()
        };
        let mut analyzer = Analyzer::default();
        analyzer.apply(&ev(EventPayload::TestSummary(summary.clone())));
        let once = analyzer.state().tests.clone();
        analyzer.apply(&ev(EventPayload::TestSummary(summary.clone())));
        assert_eq!(analyzer.state().tests, once);

        let passed = TestSummary {
            overall_status: TestStatus::Passed,
            ..summary
        };
        analyzer.apply(&ev(EventPayload::TestSummary(passed)));
        assert_eq!(analyzer.state().tests.len(), 1);
        assert_eq!(
            analyzer.state().tests["//t:unit"].overall_status,
            TestStatus::Passed
        );
    }

    #[test]
    fn test_target_outputs_follow_patterns() {
        let mut analyzer = Analyzer::default();
        analyzer.apply(&ev(EventPayload::Pattern(PatternExpanded {
            patterns: vec!["//app/...".into(), "-//app/internal/...".into()],
        })));

        let target = |label: &str, ids: &[&str]| TargetCompleted {
            label: label.into(),
            success: true,
            output_groups: vec![
                OutputGroup {
                    name: "default".into(),
                    file_sets: ids.iter().map(|s| s.to_string()).collect(),
                    incomplete: false,
                },
                OutputGroup {
                    name: "_hidden_top_level_INTERNAL_".into(),
                    file_sets: vec!["hidden".into()],
                    incomplete: false,
                },
            ],
            ..TargetCompleted::default()
        };

        analyzer.apply(&ev(EventPayload::TargetCompleted(target("//app:bin", &["1", "2"]))));
        analyzer.apply(&ev(EventPayload::TargetCompleted(target("//app:bin", &["9"]))));
        analyzer.apply(&ev(EventPayload::TargetCompleted(target("//app/internal:x", &["3"]))));
        analyzer.apply(&ev(EventPayload::TargetCompleted(target("//lib:y", &["4"]))));
        analyzer.apply(&ev(EventPayload::TargetCompleted(TargetCompleted {
            label: "//app:broken".into(),
            configuration: Some("k8".into()),
            success: false,
            ..TargetCompleted::default()
        })));

        let state = analyzer.state();
        assert_eq!(state.top_level_outputs.len(), 1);
        assert_eq!(state.top_level_outputs["//app:bin"], vec!["1", "2"]);
        assert_eq!(state.failed_targets.len(), 1);
        assert_eq!(state.failed_targets[0].configuration.as_deref(), Some("k8"));
        assert_eq!(state.requested_patterns.len(), 2);
    }

    #[test]
    fn test_aborted_problem() {
        let mut analyzer = Analyzer::default();
        analyzer.apply(&ev(EventPayload::Aborted(Aborted {
            reason: "ANALYSIS_FAILURE".into(),
            description: "no such target".into(),
            subject: EventKind::TargetCompleted,
            label: Some("@//app:gone".into()),
        })));

        let problem = &analyzer.state().problems[0];
        assert_eq!(problem.reason, "ANALYSIS_FAILURE");
        assert_eq!(problem.subject, EventKind::TargetCompleted);
        assert_eq!(problem.label.as_deref(), Some("//app:gone"));
    }

    #[test]
    fn test_single_purpose_slots() {
        let mut analyzer = Analyzer::default();
        for label in ["original", StructuredCommandLine::CANONICAL, "tool"] {
            analyzer.apply(&ev(EventPayload::StructuredCommandLine(StructuredCommandLine {
                command_line_label: label.into(),
                ..StructuredCommandLine::default()
            })));
        }
        let config = |mnemonic: &str| Configuration {
            id: "abc".into(),
            mnemonic: mnemonic.into(),
            ..Configuration::default()
        };
        analyzer.apply(&ev(EventPayload::Configuration(config("k8-fastbuild"))));
        analyzer.apply(&ev(EventPayload::Configuration(config("k8-opt"))));
        analyzer.apply(&ev(EventPayload::Unknown("fetch".into())));

        let state = analyzer.state();
        assert!(state.command_line.as_ref().unwrap().is_canonical());
        assert_eq!(state.configurations["abc"].mnemonic, "k8-fastbuild");
        assert_eq!(state.unknown_events, 1);
        assert_eq!(state.events_applied, 6);
    }

    #[test]
    fn test_pending_cache_bounded() {
        let mut cache = IndexMap::new();
        for i in 0..MAX_PENDING + 10 {
            remember(&mut cache, format!("k{}", i), "v".into());
        }
        assert_eq!(cache.len(), MAX_PENDING);
        assert!(!cache.contains_key("k0"));
        assert!(cache.contains_key(&format!("k{}", MAX_PENDING + 9)));
    }
}
