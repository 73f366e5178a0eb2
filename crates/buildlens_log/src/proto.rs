//! Hand-written prost types matching the subset of the build event protocol
//! that buildlens consumes.
//!
//! Tags follow `build_event_stream.proto`. Fields the analyzer never reads
//! are omitted; prost skips unknown fields on decode, so streams from newer
//! producers still parse. `ActionExecuted.wall_time` (tag 15) is a local
//! extension written by the simulator's fixtures and ignored by real tools.

#![allow(missing_docs)]

use std::collections::BTreeMap;

/// One record of the stream
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BuildEvent {
    #[prost(message, optional, tag = "1")]
    pub id: ::core::option::Option<BuildEventId>,
    #[prost(message, repeated, tag = "2")]
    pub children: ::prost::alloc::vec::Vec<BuildEventId>,
    #[prost(bool, tag = "20")]
    pub last_message: bool,
    #[prost(
        oneof = "build_event::Payload",
        tags = "3, 4, 5, 6, 7, 8, 9, 13, 14, 15, 16, 17, 22, 23, 24, 27"
    )]
    pub payload: ::core::option::Option<build_event::Payload>,
}

pub mod build_event {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "3")]
        Progress(super::Progress),
        #[prost(message, tag = "4")]
        Aborted(super::Aborted),
        #[prost(message, tag = "5")]
        Started(super::BuildStarted),
        #[prost(message, tag = "6")]
        Expanded(super::PatternExpanded),
        #[prost(message, tag = "7")]
        Action(super::ActionExecuted),
        #[prost(message, tag = "8")]
        Completed(super::TargetComplete),
        #[prost(message, tag = "9")]
        TestSummary(super::TestSummary),
        #[prost(message, tag = "13")]
        OptionsParsed(super::OptionsParsed),
        #[prost(message, tag = "14")]
        Finished(super::BuildFinished),
        #[prost(message, tag = "15")]
        NamedSetOfFiles(super::NamedSetOfFiles),
        #[prost(message, tag = "16")]
        WorkspaceStatus(super::WorkspaceStatus),
        #[prost(message, tag = "17")]
        Configuration(super::Configuration),
        #[prost(message, tag = "22")]
        StructuredCommandLine(super::CommandLine),
        #[prost(message, tag = "23")]
        BuildToolLogs(super::BuildToolLogs),
        #[prost(message, tag = "24")]
        BuildMetrics(super::BuildMetrics),
        #[prost(message, tag = "27")]
        ConvenienceSymlinksIdentified(super::ConvenienceSymlinksIdentified),
    }
}

/// Identifier of an event; the variant names the event kind
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BuildEventId {
    #[prost(
        oneof = "build_event_id::Id",
        tags = "2, 3, 4, 5, 6, 7, 9, 12, 13, 14, 15, 18, 20, 22, 25"
    )]
    pub id: ::core::option::Option<build_event_id::Id>,
}

pub mod build_event_id {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Id {
        #[prost(message, tag = "2")]
        Progress(ProgressId),
        #[prost(message, tag = "3")]
        Started(BuildStartedId),
        #[prost(message, tag = "4")]
        Pattern(PatternExpandedId),
        #[prost(message, tag = "5")]
        TargetCompleted(TargetCompletedId),
        #[prost(message, tag = "6")]
        ActionCompleted(ActionCompletedId),
        #[prost(message, tag = "7")]
        TestSummary(TestSummaryId),
        #[prost(message, tag = "9")]
        BuildFinished(BuildFinishedId),
        #[prost(message, tag = "12")]
        OptionsParsed(OptionsParsedId),
        #[prost(message, tag = "13")]
        NamedSet(NamedSetOfFilesId),
        #[prost(message, tag = "14")]
        WorkspaceStatus(WorkspaceStatusId),
        #[prost(message, tag = "15")]
        Configuration(ConfigurationId),
        #[prost(message, tag = "18")]
        StructuredCommandLine(StructuredCommandLineId),
        #[prost(message, tag = "20")]
        BuildToolLogs(BuildToolLogsId),
        #[prost(message, tag = "22")]
        BuildMetrics(BuildMetricsId),
        #[prost(message, tag = "25")]
        ConvenienceSymlinksIdentified(ConvenienceSymlinksIdentifiedId),
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ProgressId {
        #[prost(int32, tag = "1")]
        pub opaque_count: i32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BuildStartedId {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PatternExpandedId {
        #[prost(string, repeated, tag = "1")]
        pub pattern: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ConfigurationId {
        #[prost(string, tag = "1")]
        pub id: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TargetCompletedId {
        #[prost(string, tag = "1")]
        pub label: ::prost::alloc::string::String,
        #[prost(message, optional, tag = "3")]
        pub configuration: ::core::option::Option<ConfigurationId>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ActionCompletedId {
        #[prost(string, tag = "1")]
        pub primary_output: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub label: ::prost::alloc::string::String,
        #[prost(message, optional, tag = "3")]
        pub configuration: ::core::option::Option<ConfigurationId>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TestSummaryId {
        #[prost(string, tag = "1")]
        pub label: ::prost::alloc::string::String,
        #[prost(message, optional, tag = "2")]
        pub configuration: ::core::option::Option<ConfigurationId>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BuildFinishedId {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct OptionsParsedId {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NamedSetOfFilesId {
        #[prost(string, tag = "1")]
        pub id: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct WorkspaceStatusId {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct StructuredCommandLineId {
        #[prost(string, tag = "1")]
        pub command_line_label: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BuildToolLogsId {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BuildMetricsId {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ConvenienceSymlinksIdentifiedId {}
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Progress {
    #[prost(string, tag = "1")]
    pub stdout: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub stderr: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Aborted {
    #[prost(enumeration = "aborted::AbortReason", tag = "1")]
    pub reason: i32,
    #[prost(string, tag = "2")]
    pub description: ::prost::alloc::string::String,
}

pub mod aborted {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum AbortReason {
        Unknown = 0,
        UserInterrupted = 1,
        TimeOut = 2,
        RemoteEnvironmentFailure = 3,
        Internal = 4,
        LoadingFailure = 5,
        AnalysisFailure = 6,
        Skipped = 7,
        NoAnalyze = 8,
        NoBuild = 9,
        Incomplete = 10,
        OutOfMemory = 11,
    }

    impl AbortReason {
        /// Protocol name of the reason
        #[must_use]
        pub const fn name(self) -> &'static str {
            match self {
                Self::Unknown => "UNKNOWN",
                Self::UserInterrupted => "USER_INTERRUPTED",
                Self::TimeOut => "TIME_OUT",
                Self::RemoteEnvironmentFailure => "REMOTE_ENVIRONMENT_FAILURE",
                Self::Internal => "INTERNAL",
                Self::LoadingFailure => "LOADING_FAILURE",
                Self::AnalysisFailure => "ANALYSIS_FAILURE",
                Self::Skipped => "SKIPPED",
                Self::NoAnalyze => "NO_ANALYZE",
                Self::NoBuild => "NO_BUILD",
                Self::Incomplete => "INCOMPLETE",
                Self::OutOfMemory => "OUT_OF_MEMORY",
            }
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BuildStarted {
    #[prost(string, tag = "1")]
    pub uuid: ::prost::alloc::string::String,
    #[prost(int64, tag = "2")]
    pub start_time_millis: i64,
    #[prost(string, tag = "3")]
    pub build_tool_version: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub options_description: ::prost::alloc::string::String,
    #[prost(string, tag = "5")]
    pub command: ::prost::alloc::string::String,
    #[prost(string, tag = "6")]
    pub working_directory: ::prost::alloc::string::String,
    #[prost(string, tag = "7")]
    pub workspace_directory: ::prost::alloc::string::String,
    #[prost(int64, tag = "8")]
    pub server_pid: i64,
    #[prost(message, optional, tag = "9")]
    pub start_time: ::core::option::Option<::prost_types::Timestamp>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WorkspaceStatus {
    #[prost(message, repeated, tag = "1")]
    pub item: ::prost::alloc::vec::Vec<workspace_status::Item>,
}

pub mod workspace_status {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Item {
        #[prost(string, tag = "1")]
        pub key: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub value: ::prost::alloc::string::String,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OptionsParsed {
    #[prost(string, repeated, tag = "1")]
    pub startup_options: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(string, repeated, tag = "2")]
    pub explicit_startup_options: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(string, repeated, tag = "3")]
    pub cmd_line: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(string, repeated, tag = "4")]
    pub explicit_cmd_line: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(string, tag = "6")]
    pub tool_tag: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Configuration {
    #[prost(string, tag = "1")]
    pub mnemonic: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub platform_name: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub cpu: ::prost::alloc::string::String,
    #[prost(btree_map = "string, string", tag = "4")]
    pub make_variable: BTreeMap<::prost::alloc::string::String, ::prost::alloc::string::String>,
    #[prost(bool, tag = "5")]
    pub is_tool: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PatternExpanded {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NamedSetOfFiles {
    #[prost(message, repeated, tag = "1")]
    pub files: ::prost::alloc::vec::Vec<File>,
    #[prost(message, repeated, tag = "2")]
    pub file_sets: ::prost::alloc::vec::Vec<build_event_id::NamedSetOfFilesId>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct File {
    #[prost(string, repeated, tag = "4")]
    pub path_prefix: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(oneof = "file::File", tags = "2, 3")]
    pub file: ::core::option::Option<file::File>,
}

pub mod file {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum File {
        #[prost(string, tag = "2")]
        Uri(::prost::alloc::string::String),
        #[prost(bytes, tag = "3")]
        Contents(::prost::alloc::vec::Vec<u8>),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FailureDetail {
    #[prost(string, tag = "1")]
    pub message: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActionExecuted {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, tag = "8")]
    pub r#type: ::prost::alloc::string::String,
    #[prost(int32, tag = "2")]
    pub exit_code: i32,
    #[prost(message, optional, tag = "3")]
    pub stdout: ::core::option::Option<File>,
    #[prost(message, optional, tag = "4")]
    pub stderr: ::core::option::Option<File>,
    #[prost(string, tag = "5")]
    pub label: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "6")]
    pub primary_output: ::core::option::Option<File>,
    #[prost(message, optional, tag = "7")]
    pub configuration: ::core::option::Option<build_event_id::ConfigurationId>,
    #[prost(string, repeated, tag = "9")]
    pub command_line: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(message, optional, tag = "11")]
    pub failure_detail: ::core::option::Option<FailureDetail>,
    #[prost(message, optional, tag = "12")]
    pub start_time: ::core::option::Option<::prost_types::Timestamp>,
    #[prost(message, optional, tag = "13")]
    pub end_time: ::core::option::Option<::prost_types::Timestamp>,
    #[prost(message, optional, tag = "15")]
    pub wall_time: ::core::option::Option<::prost_types::Duration>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OutputGroup {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "3")]
    pub file_sets: ::prost::alloc::vec::Vec<build_event_id::NamedSetOfFilesId>,
    #[prost(bool, tag = "4")]
    pub incomplete: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TargetComplete {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(message, repeated, tag = "2")]
    pub output_group: ::prost::alloc::vec::Vec<OutputGroup>,
    #[prost(string, repeated, tag = "3")]
    pub tag: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(message, optional, tag = "9")]
    pub failure_detail: ::core::option::Option<FailureDetail>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TestStatus {
    NoStatus = 0,
    Passed = 1,
    Flaky = 2,
    Timeout = 3,
    Failed = 4,
    Incomplete = 5,
    RemoteFailure = 6,
    FailedToBuild = 7,
    ToolHaltedBeforeTesting = 8,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TestSummary {
    #[prost(enumeration = "TestStatus", tag = "5")]
    pub overall_status: i32,
    #[prost(int32, tag = "1")]
    pub total_run_count: i32,
    #[prost(int32, tag = "10")]
    pub run_count: i32,
    #[prost(int32, tag = "15")]
    pub attempt_count: i32,
    #[prost(int32, tag = "11")]
    pub shard_count: i32,
    #[prost(message, repeated, tag = "3")]
    pub passed: ::prost::alloc::vec::Vec<File>,
    #[prost(message, repeated, tag = "4")]
    pub failed: ::prost::alloc::vec::Vec<File>,
    #[prost(int32, tag = "6")]
    pub total_num_cached: i32,
    #[prost(int64, tag = "7")]
    pub first_start_time_millis: i64,
    #[prost(int64, tag = "8")]
    pub last_stop_time_millis: i64,
    #[prost(int64, tag = "9")]
    pub total_run_duration_millis: i64,
    #[prost(message, optional, tag = "12")]
    pub total_run_duration: ::core::option::Option<::prost_types::Duration>,
    #[prost(message, optional, tag = "13")]
    pub first_start_time: ::core::option::Option<::prost_types::Timestamp>,
    #[prost(message, optional, tag = "14")]
    pub last_stop_time: ::core::option::Option<::prost_types::Timestamp>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExitCode {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(int32, tag = "2")]
    pub code: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BuildFinished {
    #[prost(bool, tag = "1")]
    pub overall_success: bool,
    #[prost(int64, tag = "2")]
    pub finish_time_millis: i64,
    #[prost(message, optional, tag = "3")]
    pub exit_code: ::core::option::Option<ExitCode>,
    #[prost(message, optional, tag = "5")]
    pub finish_time: ::core::option::Option<::prost_types::Timestamp>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BuildToolLogs {
    #[prost(message, repeated, tag = "1")]
    pub log: ::prost::alloc::vec::Vec<File>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BuildMetrics {
    #[prost(message, optional, tag = "1")]
    pub action_summary: ::core::option::Option<build_metrics::ActionSummary>,
    #[prost(message, optional, tag = "2")]
    pub memory_metrics: ::core::option::Option<build_metrics::MemoryMetrics>,
    #[prost(message, optional, tag = "3")]
    pub target_metrics: ::core::option::Option<build_metrics::TargetMetrics>,
    #[prost(message, optional, tag = "4")]
    pub package_metrics: ::core::option::Option<build_metrics::PackageMetrics>,
    #[prost(message, optional, tag = "5")]
    pub timing_metrics: ::core::option::Option<build_metrics::TimingMetrics>,
}

pub mod build_metrics {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ActionSummary {
        #[prost(int64, tag = "1")]
        pub actions_created: i64,
        #[prost(int64, tag = "2")]
        pub actions_executed: i64,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MemoryMetrics {
        #[prost(int64, tag = "1")]
        pub used_heap_size_post_build: i64,
        #[prost(int64, tag = "2")]
        pub peak_post_gc_heap_size: i64,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TargetMetrics {
        #[prost(int64, tag = "1")]
        pub targets_loaded: i64,
        #[prost(int64, tag = "2")]
        pub targets_configured: i64,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PackageMetrics {
        #[prost(int64, tag = "1")]
        pub packages_loaded: i64,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TimingMetrics {
        #[prost(int64, tag = "1")]
        pub cpu_time_in_ms: i64,
        #[prost(int64, tag = "2")]
        pub wall_time_in_ms: i64,
        #[prost(int64, tag = "3")]
        pub analysis_phase_time_in_ms: i64,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommandLine {
    #[prost(string, tag = "1")]
    pub command_line_label: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub sections: ::prost::alloc::vec::Vec<CommandLineSection>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommandLineSection {
    #[prost(string, tag = "1")]
    pub section_label: ::prost::alloc::string::String,
    #[prost(oneof = "command_line_section::SectionType", tags = "2, 3")]
    pub section_type: ::core::option::Option<command_line_section::SectionType>,
}

pub mod command_line_section {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum SectionType {
        #[prost(message, tag = "2")]
        ChunkList(super::ChunkList),
        #[prost(message, tag = "3")]
        OptionList(super::OptionList),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChunkList {
    #[prost(string, repeated, tag = "1")]
    pub chunk: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OptionList {
    #[prost(message, repeated, tag = "1")]
    pub option: ::prost::alloc::vec::Vec<CommandLineOption>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommandLineOption {
    #[prost(string, tag = "1")]
    pub combined_form: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub option_name: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub option_value: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConvenienceSymlinksIdentified {
    #[prost(message, repeated, tag = "1")]
    pub convenience_symlinks: ::prost::alloc::vec::Vec<ConvenienceSymlink>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConvenienceSymlink {
    #[prost(string, tag = "1")]
    pub path: ::prost::alloc::string::String,
    #[prost(enumeration = "convenience_symlink::Action", tag = "2")]
    pub action: i32,
    #[prost(string, tag = "3")]
    pub target: ::prost::alloc::string::String,
}

pub mod convenience_symlink {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Action {
        Unknown = 0,
        Create = 1,
        Delete = 2,
    }
}
