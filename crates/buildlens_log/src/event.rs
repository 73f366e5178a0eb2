//! Canonical build event model.
//!
//! Both wire formats decode into these types. Identifier fields carried by
//! the wire `id` (label, configuration, primary output, named-set id,
//! patterns) are folded into the payload structs so the analyzer never has
//! to look at two places for one fact.

use buildlens_core::Timestamp;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Event kind - which slot of the build state an event feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Build started
    BuildStarted,
    /// Build finished
    BuildFinished,
    /// Action executed
    ActionCompleted,
    /// Target completed
    TargetCompleted,
    /// Test summary
    TestSummary,
    /// Problem or aborted event
    Aborted,
    /// Workspace status
    WorkspaceStatus,
    /// Build configuration
    Configuration,
    /// Build metrics
    BuildMetrics,
    /// Build tool logs
    BuildToolLogs,
    /// Options parsed
    OptionsParsed,
    /// Structured command line
    StructuredCommandLine,
    /// Pattern expanded
    Pattern,
    /// Named set of files
    NamedSet,
    /// Convenience symlinks identified
    ConvenienceSymlinks,
    /// Console progress
    Progress,
    /// Anything else
    Unknown,
}

impl EventKind {
    /// Get the snake_case kind name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BuildStarted => "build_started",
            Self::BuildFinished => "build_finished",
            Self::ActionCompleted => "action_completed",
            Self::TargetCompleted => "target_completed",
            Self::TestSummary => "test_summary",
            Self::Aborted => "aborted",
            Self::WorkspaceStatus => "workspace_status",
            Self::Configuration => "configuration",
            Self::BuildMetrics => "build_metrics",
            Self::BuildToolLogs => "build_tool_logs",
            Self::OptionsParsed => "options_parsed",
            Self::StructuredCommandLine => "structured_command_line",
            Self::Pattern => "pattern",
            Self::NamedSet => "named_set",
            Self::ConvenienceSymlinks => "convenience_symlinks",
            Self::Progress => "progress",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file reference carried by actions, tests, named sets and logs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// File name relative to its path prefix
    pub name: String,
    /// Location of the file, usually a `file://` URI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Inline contents, already base64-decoded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<Vec<u8>>,
    /// Directory components preceding `name` (e.g. `bazel-out`, `k8-fastbuild`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path_prefix: Vec<String>,
}

impl File {
    /// Create a file with just a name
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the URI
    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Path prefix and name joined with `/`
    #[must_use]
    pub fn display_path(&self) -> String {
        if self.path_prefix.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.path_prefix.join("/"), self.name)
        }
    }
}

/// Build started payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStarted {
    /// Invocation id
    pub uuid: String,
    /// When the build started
    pub start_time: Option<Timestamp>,
    /// Version string of the build tool
    pub build_tool_version: String,
    /// Human-readable summary of the options
    pub options_description: String,
    /// Command name, e.g. `build` or `test`
    pub command: String,
    /// Directory the tool was invoked from
    pub working_directory: String,
    /// Workspace root
    pub workspace_directory: String,
    /// Build server process id
    pub server_pid: i64,
}

/// Process exit code reported by the build tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitCode {
    /// Symbolic name, e.g. `BUILD_FAILURE`
    pub name: String,
    /// Numeric exit code
    pub code: i32,
}

/// Build finished payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildFinished {
    /// Legacy success flag
    pub overall_success: bool,
    /// Exit code of the invocation
    pub exit_code: Option<ExitCode>,
    /// When the build finished
    pub finish_time: Option<Timestamp>,
}

impl BuildFinished {
    /// Success according to the exit code when present, else the legacy flag
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code
            .as_ref()
            .map_or(self.overall_success, |code| code.code == 0)
    }
}

/// Action executed payload, including its id fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCompleted {
    /// Owning target label
    pub label: String,
    /// Configuration id
    pub configuration: Option<String>,
    /// Path of the primary output
    pub primary_output: String,
    /// Action type, e.g. `CppCompile`
    pub mnemonic: String,
    /// Whether the action succeeded
    pub success: bool,
    /// Process exit code
    pub exit_code: Option<i32>,
    /// Captured stdout file
    pub stdout: Option<File>,
    /// Captured stderr file
    pub stderr: Option<File>,
    /// Full argument vector
    pub command_line: Vec<String>,
    /// When the action started
    pub start_time: Option<Timestamp>,
    /// When the action ended
    pub end_time: Option<Timestamp>,
    /// Explicit wall time when the producer reports one
    pub wall_time_ms: Option<u64>,
    /// Failure detail message
    pub failure_message: Option<String>,
}

/// Output group of a completed target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputGroup {
    /// Group name, e.g. `default`
    pub name: String,
    /// Referenced named-set ids
    pub file_sets: Vec<String>,
    /// Some outputs of the group were not built
    pub incomplete: bool,
}

/// Target completed payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCompleted {
    /// Target label
    pub label: String,
    /// Configuration id
    pub configuration: Option<String>,
    /// Whether the target built
    pub success: bool,
    /// Requested output groups
    pub output_groups: Vec<OutputGroup>,
    /// Target tags
    pub tags: Vec<String>,
    /// Failure detail message
    pub failure_message: Option<String>,
}

/// Aggregated test status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// No status reported
    #[default]
    NoStatus,
    /// All runs passed
    Passed,
    /// Passed after a retry
    Flaky,
    /// Timed out
    Timeout,
    /// Failed
    Failed,
    /// Not every shard or run finished
    Incomplete,
    /// Remote execution failed
    RemoteFailure,
    /// Test target did not build
    FailedToBuild,
    /// Build stopped before the test ran
    ToolHaltedBeforeTesting,
}

impl TestStatus {
    /// Parse the protocol's SCREAMING_CASE name (case-insensitive)
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "PASSED" => Self::Passed,
            "FLAKY" => Self::Flaky,
            "TIMEOUT" => Self::Timeout,
            "FAILED" => Self::Failed,
            "INCOMPLETE" => Self::Incomplete,
            "REMOTE_FAILURE" => Self::RemoteFailure,
            "FAILED_TO_BUILD" => Self::FailedToBuild,
            "TOOL_HALTED_BEFORE_TESTING" => Self::ToolHaltedBeforeTesting,
            _ => Self::NoStatus,
        }
    }

    /// Map the protocol's numeric value
    #[must_use]
    pub const fn from_i32(value: i32) -> Self {
        match value {
            1 => Self::Passed,
            2 => Self::Flaky,
            3 => Self::Timeout,
            4 => Self::Failed,
            5 => Self::Incomplete,
            6 => Self::RemoteFailure,
            7 => Self::FailedToBuild,
            8 => Self::ToolHaltedBeforeTesting,
            _ => Self::NoStatus,
        }
    }

    /// Check if the status counts as a failure
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::Failed
                | Self::Incomplete
                | Self::RemoteFailure
                | Self::FailedToBuild
                | Self::ToolHaltedBeforeTesting
        )
    }
}

/// Test summary payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSummary {
    /// Test target label
    pub label: String,
    /// Configuration id
    pub configuration: Option<String>,
    /// Aggregated status
    pub overall_status: TestStatus,
    /// Runs across all shards and attempts
    pub total_run_count: i32,
    /// Runs per test
    pub run_count: i32,
    /// Attempts per run
    pub attempt_count: i32,
    /// Shards
    pub shard_count: i32,
    /// Runs served from cache
    pub total_num_cached: i32,
    /// Logs of passing runs
    pub passed: Vec<File>,
    /// Logs of failing runs
    pub failed: Vec<File>,
    /// Start of the first run
    pub first_start_time: Option<Timestamp>,
    /// End of the last run
    pub last_stop_time: Option<Timestamp>,
    /// Summed run duration
    pub total_run_duration_ms: Option<u64>,
}

/// Aborted payload; `subject` is the kind of the event that was aborted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aborted {
    /// Protocol reason name (e.g. `USER_INTERRUPTED`)
    pub reason: String,
    /// Free-text explanation
    pub description: String,
    /// Kind of the aborted event
    pub subject: EventKind,
    /// Label of the aborted target or action, if any
    pub label: Option<String>,
}

impl Default for Aborted {
    fn default() -> Self {
        Self {
            reason: "UNKNOWN".to_string(),
            description: String::new(),
            subject: EventKind::Unknown,
            label: None,
        }
    }
}

/// Workspace status payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceStatus {
    /// Status keys and values in stream order
    pub items: IndexMap<String, String>,
}

/// Configuration payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// Configuration id
    pub id: String,
    /// Configuration mnemonic, e.g. `k8-fastbuild`
    pub mnemonic: String,
    /// Platform name
    pub platform_name: String,
    /// Target CPU
    pub cpu: String,
    /// Make variables
    pub make_variables: IndexMap<String, String>,
    /// Exec (tool) configuration
    pub is_tool: bool,
}

/// Cumulative build metrics payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMetrics {
    /// Actions created during analysis
    pub actions_created: i64,
    /// Actions executed
    pub actions_executed: i64,
    /// Targets loaded
    pub targets_loaded: i64,
    /// Targets configured
    pub targets_configured: i64,
    /// Packages loaded
    pub packages_loaded: i64,
    /// CPU time
    pub cpu_time_ms: i64,
    /// Wall time
    pub wall_time_ms: i64,
    /// Analysis phase time
    pub analysis_phase_time_ms: i64,
    /// Heap in use after the build, bytes
    pub used_heap_size_post_build: i64,
    /// Peak heap after GC, bytes
    pub peak_post_gc_heap_size: i64,
}

/// Build tool logs payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildToolLogs {
    /// Log files and inline log entries
    pub logs: Vec<File>,
}

/// Options parsed payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionsParsed {
    /// Effective startup options
    pub startup_options: Vec<String>,
    /// Startup options given explicitly
    pub explicit_startup_options: Vec<String>,
    /// Effective command options
    pub cmd_line: Vec<String>,
    /// Command options given explicitly
    pub explicit_cmd_line: Vec<String>,
    /// Value of `--tool_tag`
    pub tool_tag: String,
}

/// One section of a structured command line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLineSection {
    /// Section name, e.g. `executable` or `command options`
    pub label: String,
    /// Chunks, or the combined form of each option
    pub args: Vec<String>,
}

/// Structured command line payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredCommandLine {
    /// Variant label, e.g. `original` or `canonical`
    pub command_line_label: String,
    /// Sections in order
    pub sections: Vec<CommandLineSection>,
}

impl StructuredCommandLine {
    /// Label of the variant the analyzer keeps
    pub const CANONICAL: &'static str = "canonical";

    /// Check whether this is the canonical variant
    #[must_use]
    pub fn is_canonical(&self) -> bool {
        self.command_line_label == Self::CANONICAL
    }

    /// All sections flattened into one argument vector
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        self.sections
            .iter()
            .flat_map(|s| s.args.iter().cloned())
            .collect()
    }
}

/// Pattern expanded payload; patterns come from the event id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternExpanded {
    /// Requested patterns
    pub patterns: Vec<String>,
}

/// Named set of files payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedSetOfFiles {
    /// Set id
    pub id: String,
    /// Files directly in the set
    pub files: Vec<File>,
    /// Ids of referenced sets
    pub file_sets: Vec<String>,
}

/// One convenience symlink
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvenienceSymlink {
    /// Symlink path relative to the workspace
    pub path: String,
    /// `CREATE`, `DELETE` or `UNKNOWN`
    pub action: String,
    /// Where the symlink points
    pub target: String,
}

/// Convenience symlinks identified payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvenienceSymlinks {
    /// Symlinks in stream order
    pub symlinks: Vec<ConvenienceSymlink>,
}

/// Progress payload: raw console output since the previous progress event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Sequence number of the progress event
    pub opaque_count: i32,
    /// Console stdout chunk
    pub stdout: String,
    /// Console stderr chunk
    pub stderr: String,
}

/// Event payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    /// Build started
    BuildStarted(BuildStarted),
    /// Build finished
    BuildFinished(BuildFinished),
    /// Action executed
    ActionCompleted(ActionCompleted),
    /// Target completed
    TargetCompleted(TargetCompleted),
    /// Test summary
    TestSummary(TestSummary),
    /// Problem or aborted event
    Aborted(Aborted),
    /// Workspace status
    WorkspaceStatus(WorkspaceStatus),
    /// Build configuration
    Configuration(Configuration),
    /// Cumulative metrics
    BuildMetrics(BuildMetrics),
    /// Build tool logs
    BuildToolLogs(BuildToolLogs),
    /// Options parsed
    OptionsParsed(OptionsParsed),
    /// Structured command line
    StructuredCommandLine(StructuredCommandLine),
    /// Pattern expanded
    Pattern(PatternExpanded),
    /// Named set of files
    NamedSet(NamedSetOfFiles),
    /// Convenience symlinks
    ConvenienceSymlinks(ConvenienceSymlinks),
    /// Console progress
    Progress(Progress),
    /// A kind this crate does not model, with its wire name
    Unknown(String),
}

/// A build event in canonical shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildEvent {
    /// Kind-specific content
    pub payload: EventPayload,
    /// Producer marked this as the final event of the stream
    #[serde(default)]
    pub last_message: bool,
}

impl BuildEvent {
    /// Create a new event
    #[must_use]
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            last_message: false,
        }
    }

    /// Mark as the last message
    #[must_use]
    pub fn with_last_message(mut self, last_message: bool) -> Self {
        self.last_message = last_message;
        self
    }

    /// Get the event kind
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match &self.payload {
            EventPayload::BuildStarted(_) => EventKind::BuildStarted,
            EventPayload::BuildFinished(_) => EventKind::BuildFinished,
            EventPayload::ActionCompleted(_) => EventKind::ActionCompleted,
            EventPayload::TargetCompleted(_) => EventKind::TargetCompleted,
            EventPayload::TestSummary(_) => EventKind::TestSummary,
            EventPayload::Aborted(_) => EventKind::Aborted,
            EventPayload::WorkspaceStatus(_) => EventKind::WorkspaceStatus,
            EventPayload::Configuration(_) => EventKind::Configuration,
            EventPayload::BuildMetrics(_) => EventKind::BuildMetrics,
            EventPayload::BuildToolLogs(_) => EventKind::BuildToolLogs,
            EventPayload::OptionsParsed(_) => EventKind::OptionsParsed,
            EventPayload::StructuredCommandLine(_) => EventKind::StructuredCommandLine,
            EventPayload::Pattern(_) => EventKind::Pattern,
            EventPayload::NamedSet(_) => EventKind::NamedSet,
            EventPayload::ConvenienceSymlinks(_) => EventKind::ConvenienceSymlinks,
            EventPayload::Progress(_) => EventKind::Progress,
            EventPayload::Unknown(_) => EventKind::Unknown,
        }
    }

    /// Check whether this event finishes the build.
    ///
    /// True for build-finished, anything flagged `last_message`, and an
    /// aborted event whose subject is build-finished.
    #[must_use]
    pub fn is_terminus(&self) -> bool {
        self.last_message
            || match &self.payload {
                EventPayload::BuildFinished(_) => true,
                EventPayload::Aborted(aborted) => aborted.subject == EventKind::BuildFinished,
                _ => false,
            }
    }
}

impl From<EventPayload> for BuildEvent {
    fn from(payload: EventPayload) -> Self {
        Self::new(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind() {
        let event = BuildEvent::new(EventPayload::BuildStarted(BuildStarted::default()));
        assert_eq!(event.kind(), EventKind::BuildStarted);
        assert!(!event.is_terminus());

        let unknown = BuildEvent::new(EventPayload::Unknown("fetch".into()));
        assert_eq!(unknown.kind(), EventKind::Unknown);
        assert_eq!(unknown.kind().to_string(), "unknown");
    }

    #[test]
    fn test_terminus() {
        let finished = BuildEvent::new(EventPayload::BuildFinished(BuildFinished::default()));
        assert!(finished.is_terminus());

        let aborted = BuildEvent::new(EventPayload::Aborted(Aborted {
            subject: EventKind::BuildFinished,
            ..Aborted::default()
        }));
        assert!(aborted.is_terminus());

        let aborted_target = BuildEvent::new(EventPayload::Aborted(Aborted {
            subject: EventKind::TargetCompleted,
            ..Aborted::default()
        }));
        assert!(!aborted_target.is_terminus());
        assert!(aborted_target.with_last_message(true).is_terminus());
    }

    #[test]
    fn test_build_finished_success() {
        let legacy = BuildFinished {
            overall_success: true,
            ..BuildFinished::default()
        };
        assert!(legacy.succeeded());

        let failed = BuildFinished {
            overall_success: true,
            exit_code: Some(ExitCode { name: "BUILD_FAILURE".into(), code: 1 }),
            finish_time: None,
        };
        assert!(!failed.succeeded());
    }

    #[test]
    fn test_test_status_names() {
        assert_eq!(TestStatus::from_name("flaky"), TestStatus::Flaky);
        assert_eq!(TestStatus::from_name("FAILED_TO_BUILD"), TestStatus::FailedToBuild);
        assert_eq!(TestStatus::from_name("bogus"), TestStatus::NoStatus);
        assert_eq!(TestStatus::from_i32(3), TestStatus::Timeout);
        assert!(TestStatus::Timeout.is_failure());
        assert!(!TestStatus::Flaky.is_failure());
    }

    #[test]
    fn test_file_display_path() {
        let mut file = File::named("foo.o");
        assert_eq!(file.display_path(), "foo.o");
        file.path_prefix = vec!["bazel-out".into(), "k8-fastbuild".into(), "bin".into()];
        assert_eq!(file.display_path(), "bazel-out/k8-fastbuild/bin/foo.o");
    }

    #[test]
    fn test_structured_command_line_args() {
        let cmd = StructuredCommandLine {
            command_line_label: "canonical".into(),
            sections: vec![
                CommandLineSection { label: "executable".into(), args: vec!["bazel".into()] },
                CommandLineSection { label: "command".into(), args: vec!["build".into()] },
            ],
        };
        assert!(cmd.is_canonical());
        assert_eq!(cmd.args(), vec!["bazel", "build"]);
    }
}
