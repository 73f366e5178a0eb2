//! JSON-lines adapter.
//!
//! Producers disagree on layout: keys may be lowerCamelCase or snake_case,
//! the same kind may use different wrapper names (`started` / `buildStarted`),
//! and the payload may sit on the record or inside a `payload` object.
//! Everything is mapped onto the canonical [`BuildEvent`] here so the
//! analyzer sees one shape.

use crate::error::DecodeError;
use crate::event::*;
use crate::proto::aborted::AbortReason;
use base64::Engine;
use buildlens_core::{parse_duration_ms, Timestamp};
use indexmap::IndexMap;
use serde_json::{Map, Value};

type Object = Map<String, Value>;

/// Envelope keys that never hold a payload
const ENVELOPE_KEYS: [&str; 4] = ["id", "children", "lastmessage", "payload"];

/// Parse one JSON line into a canonical event.
///
/// Returns `Ok(None)` for a blank line.
///
/// # Errors
///
/// Returns [`DecodeError::MalformedLine`] (with line 0) if the text is not a
/// JSON object or carries neither an event id nor a known payload
pub fn parse_line(line: &str) -> Result<Option<BuildEvent>, DecodeError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(trimmed).map_err(|e| malformed(e.to_string()))?;
    let Value::Object(record) = value else {
        return Err(malformed("record is not a JSON object"));
    };

    normalize(&record).map(Some)
}

/// Map a parsed record onto the canonical shape
fn normalize(record: &Object) -> Result<BuildEvent, DecodeError> {
    let empty = Object::new();
    let last_message = field(record, "lastMessage").is_some_and(as_bool);

    // `{"id": {"targetCompleted": {...}}}`
    let id_entry = field(record, "id")
        .and_then(Value::as_object)
        .and_then(|id| id.iter().next())
        .map(|(name, body)| (name.as_str(), body.as_object().unwrap_or(&empty)));
    let id_kind = id_entry.and_then(|(name, _)| kind_for_key(name));
    let id_body = id_entry.map_or(&empty, |(_, body)| body);

    let wrapper = field(record, "payload").and_then(Value::as_object);
    let located = find_payload(record)
        .or_else(|| wrapper.and_then(|w| unwrap_payload(w, id_kind)))
        .or_else(|| id_kind.map(|kind| (kind, &empty)));

    let Some((kind, body)) = located else {
        return match id_entry {
            Some((name, _)) => Ok(BuildEvent::new(EventPayload::Unknown(name.to_string()))
                .with_last_message(last_message)),
            None => Err(malformed("record has no event id or known payload")),
        };
    };

    let payload = match kind {
        EventKind::BuildStarted => EventPayload::BuildStarted(started(body)),
        EventKind::BuildFinished => EventPayload::BuildFinished(finished(body)),
        EventKind::ActionCompleted => EventPayload::ActionCompleted(action(body, id_body)),
        EventKind::TargetCompleted => {
            EventPayload::TargetCompleted(target_completed(body, id_body))
        }
        EventKind::TestSummary => EventPayload::TestSummary(test_summary(body, id_body)),
        EventKind::Aborted => EventPayload::Aborted(aborted(body, id_kind, id_body)),
        EventKind::WorkspaceStatus => EventPayload::WorkspaceStatus(workspace_status(body)),
        EventKind::Configuration => EventPayload::Configuration(configuration(body, id_body)),
        EventKind::BuildMetrics => EventPayload::BuildMetrics(build_metrics(body)),
        EventKind::BuildToolLogs => EventPayload::BuildToolLogs(BuildToolLogs {
            logs: files_of(body, "log"),
        }),
        EventKind::OptionsParsed => EventPayload::OptionsParsed(options_parsed(body)),
        EventKind::StructuredCommandLine => {
            EventPayload::StructuredCommandLine(command_line(body, id_body))
        }
        EventKind::Pattern => EventPayload::Pattern(PatternExpanded {
            patterns: strings_of(id_body, "pattern"),
        }),
        EventKind::NamedSet => EventPayload::NamedSet(NamedSetOfFiles {
            id: str_of(id_body, "id"),
            files: files_of(body, "files"),
            file_sets: set_ids_of(body, "fileSets"),
        }),
        EventKind::ConvenienceSymlinks => {
            EventPayload::ConvenienceSymlinks(convenience_symlinks(body))
        }
        EventKind::Progress => EventPayload::Progress(Progress {
            opaque_count: i32_of(id_body, "opaqueCount"),
            stdout: str_of(body, "stdout"),
            stderr: str_of(body, "stderr"),
        }),
        EventKind::Unknown => EventPayload::Unknown(String::new()),
    };

    Ok(BuildEvent::new(payload).with_last_message(last_message))
}

fn malformed(reason: impl Into<String>) -> DecodeError {
    DecodeError::MalformedLine {
        line: 0,
        reason: reason.into(),
    }
}

/// Lowercase a key and drop separators so camelCase and snake_case compare equal
fn canon(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Map a wrapper or id key onto an event kind
fn kind_for_key(key: &str) -> Option<EventKind> {
    let kind = match canon(key).as_str() {
        "progress" => EventKind::Progress,
        "aborted" => EventKind::Aborted,
        "started" | "buildstarted" => EventKind::BuildStarted,
        "finished" | "buildfinished" => EventKind::BuildFinished,
        "action" | "actionexecuted" | "actioncompleted" => EventKind::ActionCompleted,
        "completed" | "targetcomplete" | "targetcompleted" => EventKind::TargetCompleted,
        "testsummary" => EventKind::TestSummary,
        "workspacestatus" => EventKind::WorkspaceStatus,
        "configuration" => EventKind::Configuration,
        "buildmetrics" => EventKind::BuildMetrics,
        "buildtoollogs" => EventKind::BuildToolLogs,
        "optionsparsed" => EventKind::OptionsParsed,
        "structuredcommandline" => EventKind::StructuredCommandLine,
        "expanded" | "patternexpanded" | "pattern" => EventKind::Pattern,
        "namedsetoffiles" | "namedset" => EventKind::NamedSet,
        "conveniencesymlinksidentified" | "conveniencesymlinks" => {
            EventKind::ConvenienceSymlinks
        }
        _ => return None,
    };
    Some(kind)
}

/// First key of `obj` naming a known payload
fn find_payload(obj: &Object) -> Option<(EventKind, &Object)> {
    obj.iter()
        .filter(|(key, _)| !ENVELOPE_KEYS.contains(&canon(key).as_str()))
        .find_map(|(key, value)| Some((kind_for_key(key)?, value.as_object()?)))
}

/// Resolve a generic `payload` wrapper.
///
/// The wrapper either holds a kind key (`{"payload": {"started": {..}}}`) or
/// is itself the body of the kind named by the id. A body field that happens
/// to look like a kind key (an action's `configuration`) must not win over
/// the id.
fn unwrap_payload(
    wrapper: &Object,
    id_kind: Option<EventKind>,
) -> Option<(EventKind, &Object)> {
    match (find_payload(wrapper), id_kind) {
        (Some((kind, body)), Some(expected))
            if kind == expected || kind == EventKind::Aborted =>
        {
            Some((kind, body))
        }
        (Some(found), None) => Some(found),
        (_, Some(expected)) => Some((expected, wrapper)),
        (None, None) => None,
    }
}

/// Look up a field under either naming convention
fn field<'a>(obj: &'a Object, name: &str) -> Option<&'a Value> {
    if let Some(value) = obj.get(name) {
        return Some(value);
    }
    let want = canon(name);
    obj.iter()
        .find(|(key, _)| canon(key) == want)
        .map(|(_, value)| value)
}

fn nested<'a>(obj: &'a Object, name: &str) -> Option<&'a Object> {
    field(obj, name).and_then(Value::as_object)
}

fn as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// int64 fields arrive as numbers or decimal strings; anything else is zero
fn as_i64(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn i64_of(obj: &Object, name: &str) -> i64 {
    field(obj, name).map_or(0, as_i64)
}

fn i32_of(obj: &Object, name: &str) -> i32 {
    i32::try_from(i64_of(obj, name)).unwrap_or(0)
}

fn bool_of(obj: &Object, name: &str) -> bool {
    field(obj, name).is_some_and(as_bool)
}

fn str_of(obj: &Object, name: &str) -> String {
    match field(obj, name) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn opt_str(obj: &Object, name: &str) -> Option<String> {
    Some(str_of(obj, name)).filter(|s| !s.is_empty())
}

fn strings_of(obj: &Object, name: &str) -> Vec<String> {
    field(obj, name)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// `startTime` as RFC 3339 or `{seconds, nanos}`, falling back to `startTimeMillis`
fn timestamp_of(obj: &Object, name: &str) -> Option<Timestamp> {
    match field(obj, name) {
        Some(Value::String(text)) => match Timestamp::parse_rfc3339(text) {
            Ok(ts) => return Some(ts),
            Err(err) => tracing::debug!(field = name, error = %err, "Ignoring unparseable timestamp"),
        },
        Some(Value::Object(parts)) => {
            return Some(Timestamp::from_proto(
                i64_of(parts, "seconds"),
                i32_of(parts, "nanos"),
            ));
        }
        Some(value @ Value::Number(_)) => return Some(Timestamp::from_millis(as_i64(value))),
        _ => {}
    }
    field(obj, &format!("{}Millis", name)).map(|v| Timestamp::from_millis(as_i64(v)))
}

/// `wallTime` as `"1.5s"`, `{seconds, nanos}` or a millisecond number,
/// falling back to `wallTimeMillis`
fn duration_of(obj: &Object, name: &str) -> Option<u64> {
    let millis = |v: &Value| u64::try_from(as_i64(v)).unwrap_or(0);
    match field(obj, name) {
        Some(Value::String(text)) => match parse_duration_ms(text) {
            Ok(ms) => return Some(ms),
            Err(err) => tracing::debug!(field = name, error = %err, "Ignoring unparseable duration"),
        },
        Some(Value::Object(parts)) => {
            let secs = u64::try_from(i64_of(parts, "seconds")).unwrap_or(0);
            let nanos = u64::try_from(i64_of(parts, "nanos")).unwrap_or(0);
            return Some(secs.saturating_mul(1_000) + nanos / 1_000_000);
        }
        Some(value @ Value::Number(_)) => return Some(millis(value)),
        _ => {}
    }
    field(obj, &format!("{}Millis", name))
        .or_else(|| field(obj, &format!("{}Ms", name)))
        .map(millis)
}

/// Configuration id given as `{"id": "..."}` or a bare string
fn config_id_of(obj: &Object) -> Option<String> {
    match field(obj, "configuration")? {
        Value::Object(config) => opt_str(config, "id"),
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        _ => None,
    }
}

fn file_of(value: &Value) -> Option<File> {
    let obj = value.as_object()?;
    let contents = field(obj, "contents").and_then(Value::as_str).and_then(|encoded| {
        match base64::engine::general_purpose::STANDARD.decode(encoded) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                tracing::debug!(error = %err, "Ignoring undecodable inline file contents");
                None
            }
        }
    });
    Some(File {
        name: str_of(obj, "name"),
        uri: opt_str(obj, "uri"),
        contents,
        path_prefix: strings_of(obj, "pathPrefix"),
    })
}

fn files_of(obj: &Object, name: &str) -> Vec<File> {
    field(obj, name)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(file_of).collect())
        .unwrap_or_default()
}

/// Named-set references given as `[{"id": "3"}]` or `["3"]`
fn set_ids_of(obj: &Object, name: &str) -> Vec<String> {
    field(obj, name)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::Object(set) => opt_str(set, "id"),
                    Value::String(id) => Some(id.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn failure_message_of(obj: &Object) -> Option<String> {
    nested(obj, "failureDetail").and_then(|detail| opt_str(detail, "message"))
}

fn started(body: &Object) -> BuildStarted {
    BuildStarted {
        uuid: str_of(body, "uuid"),
        start_time: timestamp_of(body, "startTime"),
        build_tool_version: str_of(body, "buildToolVersion"),
        options_description: str_of(body, "optionsDescription"),
        command: str_of(body, "command"),
        working_directory: str_of(body, "workingDirectory"),
        workspace_directory: str_of(body, "workspaceDirectory"),
        server_pid: i64_of(body, "serverPid"),
    }
}

fn finished(body: &Object) -> BuildFinished {
    BuildFinished {
        overall_success: bool_of(body, "overallSuccess"),
        exit_code: nested(body, "exitCode").map(|code| ExitCode {
            name: str_of(code, "name"),
            code: i32_of(code, "code"),
        }),
        finish_time: timestamp_of(body, "finishTime"),
    }
}

fn action(body: &Object, id: &Object) -> ActionCompleted {
    let primary_output = opt_str(id, "primaryOutput").or_else(|| {
        field(body, "primaryOutput").and_then(|v| match v {
            Value::String(path) => Some(path.clone()),
            other => file_of(other).map(|f| f.uri.clone().unwrap_or_else(|| f.display_path())),
        })
    });
    let mnemonic = opt_str(body, "type").unwrap_or_else(|| str_of(body, "mnemonic"));

    ActionCompleted {
        label: opt_str(id, "label").unwrap_or_else(|| str_of(body, "label")),
        configuration: config_id_of(id).or_else(|| config_id_of(body)),
        primary_output: primary_output.unwrap_or_default(),
        mnemonic,
        success: bool_of(body, "success"),
        exit_code: field(body, "exitCode").map(|v| i32::try_from(as_i64(v)).unwrap_or(0)),
        stdout: field(body, "stdout").and_then(file_of),
        stderr: field(body, "stderr").and_then(file_of),
        command_line: strings_of(body, "commandLine"),
        start_time: timestamp_of(body, "startTime"),
        end_time: timestamp_of(body, "endTime"),
        wall_time_ms: duration_of(body, "wallTime"),
        failure_message: failure_message_of(body),
    }
}

fn target_completed(body: &Object, id: &Object) -> TargetCompleted {
    let output_groups = field(body, "outputGroup")
        .and_then(Value::as_array)
        .map(|groups| {
            groups
                .iter()
                .filter_map(Value::as_object)
                .map(|group| OutputGroup {
                    name: str_of(group, "name"),
                    file_sets: set_ids_of(group, "fileSets"),
                    incomplete: bool_of(group, "incomplete"),
                })
                .collect()
        })
        .unwrap_or_default();

    TargetCompleted {
        label: opt_str(id, "label").unwrap_or_else(|| str_of(body, "label")),
        configuration: config_id_of(id),
        success: bool_of(body, "success"),
        output_groups,
        tags: strings_of(body, "tag"),
        failure_message: failure_message_of(body),
    }
}

fn test_summary(body: &Object, id: &Object) -> TestSummary {
    let overall_status = match field(body, "overallStatus") {
        Some(Value::String(name)) => TestStatus::from_name(name),
        Some(value) => TestStatus::from_i32(i32::try_from(as_i64(value)).unwrap_or(0)),
        None => TestStatus::NoStatus,
    };

    TestSummary {
        label: opt_str(id, "label").unwrap_or_else(|| str_of(body, "label")),
        configuration: config_id_of(id),
        overall_status,
        total_run_count: i32_of(body, "totalRunCount"),
        run_count: i32_of(body, "runCount"),
        attempt_count: i32_of(body, "attemptCount"),
        shard_count: i32_of(body, "shardCount"),
        total_num_cached: i32_of(body, "totalNumCached"),
        passed: files_of(body, "passed"),
        failed: files_of(body, "failed"),
        first_start_time: timestamp_of(body, "firstStartTime"),
        last_stop_time: timestamp_of(body, "lastStopTime"),
        total_run_duration_ms: duration_of(body, "totalRunDuration"),
    }
}

fn aborted(body: &Object, subject: Option<EventKind>, id: &Object) -> Aborted {
    let reason = match field(body, "reason") {
        Some(Value::String(name)) => name.to_ascii_uppercase(),
        Some(value) => i32::try_from(as_i64(value))
            .ok()
            .and_then(|n| AbortReason::try_from(n).ok())
            .unwrap_or(AbortReason::Unknown)
            .name()
            .to_string(),
        None => AbortReason::Unknown.name().to_string(),
    };

    Aborted {
        reason,
        description: str_of(body, "description"),
        subject: subject.unwrap_or(EventKind::Unknown),
        label: opt_str(id, "label"),
    }
}

fn workspace_status(body: &Object) -> WorkspaceStatus {
    let items = field(body, "item")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|item| (str_of(item, "key"), str_of(item, "value")))
                .collect()
        })
        .unwrap_or_default();
    WorkspaceStatus { items }
}

fn configuration(body: &Object, id: &Object) -> Configuration {
    let make_variables: IndexMap<String, String> = nested(body, "makeVariable")
        .map(|vars| {
            vars.iter()
                .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                .collect()
        })
        .unwrap_or_default();

    Configuration {
        id: str_of(id, "id"),
        mnemonic: str_of(body, "mnemonic"),
        platform_name: str_of(body, "platformName"),
        cpu: str_of(body, "cpu"),
        make_variables,
        is_tool: bool_of(body, "isTool"),
    }
}

fn build_metrics(body: &Object) -> BuildMetrics {
    let empty = Object::new();
    let section = |name: &str| nested(body, name).unwrap_or(&empty);
    let actions = section("actionSummary");
    let memory = section("memoryMetrics");
    let targets = section("targetMetrics");
    let packages = section("packageMetrics");
    let timing = section("timingMetrics");

    BuildMetrics {
        actions_created: i64_of(actions, "actionsCreated"),
        actions_executed: i64_of(actions, "actionsExecuted"),
        targets_loaded: i64_of(targets, "targetsLoaded"),
        targets_configured: i64_of(targets, "targetsConfigured"),
        packages_loaded: i64_of(packages, "packagesLoaded"),
        cpu_time_ms: i64_of(timing, "cpuTimeInMs"),
        wall_time_ms: i64_of(timing, "wallTimeInMs"),
        analysis_phase_time_ms: i64_of(timing, "analysisPhaseTimeInMs"),
        used_heap_size_post_build: i64_of(memory, "usedHeapSizePostBuild"),
        peak_post_gc_heap_size: i64_of(memory, "peakPostGcHeapSize"),
    }
}

fn options_parsed(body: &Object) -> OptionsParsed {
    OptionsParsed {
        startup_options: strings_of(body, "startupOptions"),
        explicit_startup_options: strings_of(body, "explicitStartupOptions"),
        cmd_line: strings_of(body, "cmdLine"),
        explicit_cmd_line: strings_of(body, "explicitCmdLine"),
        tool_tag: str_of(body, "toolTag"),
    }
}

fn command_line(body: &Object, id: &Object) -> StructuredCommandLine {
    let sections = field(body, "sections")
        .and_then(Value::as_array)
        .map(|sections| {
            sections
                .iter()
                .filter_map(Value::as_object)
                .map(|section| {
                    let chunks = nested(section, "chunkList")
                        .map(|list| strings_of(list, "chunk"))
                        .unwrap_or_default();
                    let options = nested(section, "optionList")
                        .and_then(|list| field(list, "option"))
                        .and_then(Value::as_array)
                        .map(|options| {
                            options
                                .iter()
                                .filter_map(Value::as_object)
                                .map(|option| str_of(option, "combinedForm"))
                                .collect::<Vec<_>>()
                        })
                        .unwrap_or_default();
                    CommandLineSection {
                        label: str_of(section, "sectionLabel"),
                        args: chunks.into_iter().chain(options).collect(),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    StructuredCommandLine {
        command_line_label: opt_str(body, "commandLineLabel")
            .unwrap_or_else(|| str_of(id, "commandLineLabel")),
        sections,
    }
}

fn convenience_symlinks(body: &Object) -> ConvenienceSymlinks {
    let symlinks = field(body, "convenienceSymlinks")
        .and_then(Value::as_array)
        .map(|links| {
            links
                .iter()
                .filter_map(Value::as_object)
                .map(|link| {
                    let action = match field(link, "action") {
                        Some(Value::String(name)) => name.to_ascii_uppercase(),
                        Some(value) => match as_i64(value) {
                            1 => "CREATE".to_string(),
                            2 => "DELETE".to_string(),
                            _ => "UNKNOWN".to_string(),
                        },
                        None => "UNKNOWN".to_string(),
                    };
                    ConvenienceSymlink {
                        path: str_of(link, "path"),
                        action,
                        target: str_of(link, "target"),
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    ConvenienceSymlinks { symlinks }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> BuildEvent {
        parse_line(line).unwrap().unwrap()
    }

    #[test]
    fn test_blank_and_malformed() {
        assert_eq!(parse_line("   ").unwrap(), None);
        assert!(matches!(
            parse_line("{not json"),
            Err(DecodeError::MalformedLine { .. })
        ));
        assert!(parse_line("[1, 2]").is_err());
        assert!(parse_line(r#"{"foo": 1}"#).is_err());
    }

    #[test]
    fn test_started_wrapper_aliases() {
        let camel = parse(
            r#"{"id":{"started":{}},"started":{"uuid":"u1","startTimeMillis":"1000","command":"build"}}"#,
        );
        let legacy = parse(
            r#"{"id":{"buildStarted":{}},"buildStarted":{"uuid":"u1","start_time_millis":1000,"command":"build"}}"#,
        );
        let wrapped = parse(
            r#"{"id":{"started":{}},"payload":{"uuid":"u1","startTime":"1970-01-01T00:00:01Z","command":"build"}}"#,
        );
        assert_eq!(camel, legacy);
        assert_eq!(camel, wrapped);

        let EventPayload::BuildStarted(started) = camel.payload else {
            panic!("expected build started");
        };
        assert_eq!(started.start_time, Some(Timestamp::from_millis(1_000)));
        assert_eq!(started.command, "build");
    }

    #[test]
    fn test_payload_wrapper_with_kind_key() {
        let event = parse(r#"{"payload":{"finished":{"overallSuccess":true,"finishTimeMillis":600}}}"#);
        let EventPayload::BuildFinished(finished) = event.payload else {
            panic!("expected build finished");
        };
        assert!(finished.overall_success);
        assert_eq!(finished.finish_time, Some(Timestamp::from_millis(600)));
    }

    #[test]
    fn test_action_fields() {
        let event = parse(
            r#"{"id":{"actionCompleted":{"primaryOutput":"bazel-out/bin/foo.o","label":"//app:foo","configuration":{"id":"cfg1"}}},
                "action":{"success":false,"type":"CppCompile","exitCode":1,
                "stderr":{"name":"stderr","uri":"file:///tmp/err"},
                "commandLine":["gcc","-c","foo.cc"],"wallTime":"0.500s"}}"#,
        );
        let EventPayload::ActionCompleted(action) = event.payload else {
            panic!("expected action");
        };
        assert_eq!(action.label, "//app:foo");
        assert_eq!(action.configuration.as_deref(), Some("cfg1"));
        assert_eq!(action.primary_output, "bazel-out/bin/foo.o");
        assert_eq!(action.mnemonic, "CppCompile");
        assert_eq!(action.exit_code, Some(1));
        assert_eq!(action.wall_time_ms, Some(500));
        assert_eq!(action.command_line.len(), 3);
        assert_eq!(
            action.stderr.and_then(|f| f.uri).as_deref(),
            Some("file:///tmp/err")
        );
    }

    #[test]
    fn test_malformed_numerics_default_to_zero() {
        let event = parse(
            r#"{"id":{"testSummary":{"label":"//t:t"}},"testSummary":{"overallStatus":"PASSED","totalRunCount":"lots","shardCount":"2"}}"#,
        );
        let EventPayload::TestSummary(summary) = event.payload else {
            panic!("expected test summary");
        };
        assert_eq!(summary.total_run_count, 0);
        assert_eq!(summary.shard_count, 2);
        assert_eq!(summary.overall_status, TestStatus::Passed);
    }

    #[test]
    fn test_named_set_and_target() {
        let set = parse(
            r#"{"id":{"namedSet":{"id":"1"}},"namedSetOfFiles":{"files":[{"name":"a.txt","uri":"file:///a.txt","pathPrefix":["bazel-out"]},{"name":"b","contents":"aGk="}],"fileSets":[{"id":"0"}]}}"#,
        );
        let EventPayload::NamedSet(set) = set.payload else {
            panic!("expected named set");
        };
        assert_eq!(set.id, "1");
        assert_eq!(set.file_sets, vec!["0"]);
        assert_eq!(set.files[0].display_path(), "bazel-out/a.txt");
        assert_eq!(set.files[1].contents.as_deref(), Some(&b"hi"[..]));

        let target = parse(
            r#"{"id":{"targetCompleted":{"label":"//app:bin"}},"completed":{"success":true,"outputGroup":[{"name":"default","fileSets":[{"id":"1"}]}]}}"#,
        );
        let EventPayload::TargetCompleted(target) = target.payload else {
            panic!("expected target completed");
        };
        assert!(target.success);
        assert_eq!(target.output_groups[0].file_sets, vec!["1"]);
    }

    #[test]
    fn test_aborted_subject_and_terminus() {
        let event = parse(
            r#"{"id":{"buildFinished":{}},"aborted":{"reason":"USER_INTERRUPTED","description":"ctrl-c"},"lastMessage":true}"#,
        );
        assert!(event.is_terminus());
        let EventPayload::Aborted(aborted) = event.payload else {
            panic!("expected aborted");
        };
        assert_eq!(aborted.subject, EventKind::BuildFinished);
        assert_eq!(aborted.reason, "USER_INTERRUPTED");

        let numeric = parse(r#"{"id":{"targetCompleted":{"label":"//x:y"}},"aborted":{"reason":6}}"#);
        let EventPayload::Aborted(aborted) = numeric.payload else {
            panic!("expected aborted");
        };
        assert_eq!(aborted.reason, "ANALYSIS_FAILURE");
        assert_eq!(aborted.label.as_deref(), Some("//x:y"));
    }

    #[test]
    fn test_unknown_kind() {
        let event = parse(r#"{"id":{"fetch":{"url":"https://x"}},"fetch":{"success":true}}"#);
        assert_eq!(event.payload, EventPayload::Unknown("fetch".into()));
    }

    #[test]
    fn test_structured_command_line() {
        let event = parse(
            r#"{"id":{"structuredCommandLine":{"commandLineLabel":"canonical"}},"structuredCommandLine":{"commandLineLabel":"canonical","sections":[{"sectionLabel":"executable","chunkList":{"chunk":["bazel"]}},{"sectionLabel":"command options","optionList":{"option":[{"combinedForm":"--jobs=4"}]}}]}}"#,
        );
        let EventPayload::StructuredCommandLine(cmd) = event.payload else {
            panic!("expected command line");
        };
        assert!(cmd.is_canonical());
        assert_eq!(cmd.args(), vec!["bazel", "--jobs=4"]);
    }

    #[test]
    fn test_progress_and_pattern() {
        let progress = parse(
            r#"{"id":{"progress":{"opaqueCount":3}},"progress":{"stderr":"[1 / 2] Compiling a.cc\n"}}"#,
        );
        assert_eq!(
            progress.payload,
            EventPayload::Progress(Progress {
                opaque_count: 3,
                stdout: String::new(),
                stderr: "[1 / 2] Compiling a.cc\n".into(),
            })
        );

        let pattern = parse(r#"{"id":{"pattern":{"pattern":["//app/...","-//app/legacy/..."]}},"expanded":{}}"#);
        let EventPayload::Pattern(pattern) = pattern.payload else {
            panic!("expected pattern");
        };
        assert_eq!(pattern.patterns.len(), 2);
    }

    #[test]
    fn test_metrics_and_workspace() {
        let metrics = parse(
            r#"{"id":{"buildMetrics":{}},"buildMetrics":{"actionSummary":{"actionsExecuted":"42"},"timingMetrics":{"wallTimeInMs":"600"}}}"#,
        );
        let EventPayload::BuildMetrics(metrics) = metrics.payload else {
            panic!("expected metrics");
        };
        assert_eq!(metrics.actions_executed, 42);
        assert_eq!(metrics.wall_time_ms, 600);

        let status = parse(
            r#"{"id":{"workspaceStatus":{}},"workspaceStatus":{"item":[{"key":"BUILD_USER","value":"ci"}]}}"#,
        );
        let EventPayload::WorkspaceStatus(status) = status.payload else {
            panic!("expected workspace status");
        };
        assert_eq!(status.items.get("BUILD_USER").map(String::as_str), Some("ci"));
    }
}
