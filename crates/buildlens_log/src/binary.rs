//! Length-prefixed protobuf records.
//!
//! Each record is a base-128 varint byte length followed by one serialized
//! `BuildEvent`. The stream carries no sync markers, so any framing or
//! decode error ends it.

use crate::error::DecodeError;
use crate::event::*;
use crate::proto::{self, build_event::Payload, build_event_id::Id};
use buildlens_core::Timestamp;
use prost::Message;
use std::io::{BufRead, ErrorKind, Read};

/// Largest record accepted from a stream
pub const MAX_FRAME_BYTES: u64 = 64 * 1024 * 1024;

/// Maximum encoded size of a u64 varint
const MAX_VARINT_BYTES: usize = 10;

/// Read one varint length prefix.
///
/// Returns `Ok(None)` on clean end of input before the first byte, and the
/// decoded value with the number of prefix bytes otherwise.
///
/// # Errors
///
/// Returns error on I/O failure, end of input mid-prefix, or overflow
pub fn read_varint<R: BufRead>(
    reader: &mut R,
    offset: u64,
) -> Result<Option<(u64, usize)>, DecodeError> {
    let mut value: u64 = 0;
    let mut consumed = 0usize;
    loop {
        let mut byte = [0u8; 1];
        match reader.read(&mut byte) {
            Ok(0) if consumed == 0 => return Ok(None),
            Ok(0) => {
                return Err(DecodeError::Truncated {
                    offset,
                    expected: consumed as u64 + 1,
                    actual: consumed as u64,
                });
            }
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(DecodeError::Io {
                    offset: offset + consumed as u64,
                    message: err.to_string(),
                });
            }
        }

        let b = byte[0];
        // The tenth byte may only contribute the top bit of a u64.
        if consumed == MAX_VARINT_BYTES - 1 && b > 1 {
            return Err(DecodeError::VarintOverflow { offset });
        }
        value |= u64::from(b & 0x7F) << (7 * consumed);
        consumed += 1;
        if b & 0x80 == 0 {
            return Ok(Some((value, consumed)));
        }
        if consumed == MAX_VARINT_BYTES {
            return Err(DecodeError::VarintOverflow { offset });
        }
    }
}

/// A framed record read from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Record bytes without the prefix
    pub body: Vec<u8>,
    /// Prefix length in bytes
    pub prefix_len: usize,
}

/// Read one length-prefixed record.
///
/// # Errors
///
/// Returns error if the prefix is bad, the frame exceeds `limit`, or the
/// body is cut short
pub fn read_frame<R: BufRead>(
    reader: &mut R,
    offset: u64,
    limit: u64,
) -> Result<Option<Frame>, DecodeError> {
    let Some((len, prefix_len)) = read_varint(reader, offset)? else {
        return Ok(None);
    };
    if len > limit {
        return Err(DecodeError::FrameTooLarge { offset, len, limit });
    }

    let mut body = Vec::with_capacity(len.min(64 * 1024) as usize);
    reader
        .by_ref()
        .take(len)
        .read_to_end(&mut body)
        .map_err(|err| DecodeError::Io {
            offset,
            message: err.to_string(),
        })?;
    if (body.len() as u64) < len {
        return Err(DecodeError::Truncated {
            offset,
            expected: len,
            actual: body.len() as u64,
        });
    }

    Ok(Some(Frame { body, prefix_len }))
}

/// Decode one record body into a canonical event.
///
/// # Errors
///
/// Returns [`DecodeError::Protobuf`] if the bytes are not a `BuildEvent`
pub fn decode_event(bytes: &[u8], offset: u64) -> Result<BuildEvent, DecodeError> {
    let message = proto::BuildEvent::decode(bytes).map_err(|err| DecodeError::Protobuf {
        offset,
        message: err.to_string(),
    })?;
    Ok(from_proto(message))
}

/// Convert a wire message into the canonical shape
#[must_use]
pub fn from_proto(message: proto::BuildEvent) -> BuildEvent {
    let id = message.id.and_then(|id| id.id);
    let payload = message.payload.or_else(|| id.as_ref().and_then(empty_payload));

    let payload = match payload {
        None => EventPayload::Unknown(id_name(id.as_ref()).to_string()),
        Some(payload) => convert_payload(payload, id.as_ref()),
    };

    BuildEvent::new(payload).with_last_message(message.last_message)
}

/// Payload implied by an id when the record carries none
fn empty_payload(id: &Id) -> Option<Payload> {
    let payload = match id {
        Id::Progress(_) => Payload::Progress(Default::default()),
        Id::Started(_) => Payload::Started(Default::default()),
        Id::Pattern(_) => Payload::Expanded(Default::default()),
        Id::TargetCompleted(_) => Payload::Completed(Default::default()),
        Id::ActionCompleted(_) => Payload::Action(Default::default()),
        Id::TestSummary(_) => Payload::TestSummary(Default::default()),
        Id::BuildFinished(_) => Payload::Finished(Default::default()),
        Id::OptionsParsed(_) => Payload::OptionsParsed(Default::default()),
        Id::NamedSet(_) => Payload::NamedSetOfFiles(Default::default()),
        Id::WorkspaceStatus(_) => Payload::WorkspaceStatus(Default::default()),
        Id::Configuration(_) => Payload::Configuration(Default::default()),
        Id::StructuredCommandLine(_) => Payload::StructuredCommandLine(Default::default()),
        Id::BuildToolLogs(_) => Payload::BuildToolLogs(Default::default()),
        Id::BuildMetrics(_) => Payload::BuildMetrics(Default::default()),
        Id::ConvenienceSymlinksIdentified(_) => {
            Payload::ConvenienceSymlinksIdentified(Default::default())
        }
    };
    Some(payload)
}

fn id_kind(id: Option<&Id>) -> EventKind {
    match id {
        Some(Id::Progress(_)) => EventKind::Progress,
        Some(Id::Started(_)) => EventKind::BuildStarted,
        Some(Id::Pattern(_)) => EventKind::Pattern,
        Some(Id::TargetCompleted(_)) => EventKind::TargetCompleted,
        Some(Id::ActionCompleted(_)) => EventKind::ActionCompleted,
        Some(Id::TestSummary(_)) => EventKind::TestSummary,
        Some(Id::BuildFinished(_)) => EventKind::BuildFinished,
        Some(Id::OptionsParsed(_)) => EventKind::OptionsParsed,
        Some(Id::NamedSet(_)) => EventKind::NamedSet,
        Some(Id::WorkspaceStatus(_)) => EventKind::WorkspaceStatus,
        Some(Id::Configuration(_)) => EventKind::Configuration,
        Some(Id::StructuredCommandLine(_)) => EventKind::StructuredCommandLine,
        Some(Id::BuildToolLogs(_)) => EventKind::BuildToolLogs,
        Some(Id::BuildMetrics(_)) => EventKind::BuildMetrics,
        Some(Id::ConvenienceSymlinksIdentified(_)) => EventKind::ConvenienceSymlinks,
        None => EventKind::Unknown,
    }
}

fn id_name(id: Option<&Id>) -> &'static str {
    match id {
        None => "unset",
        some => id_kind(some).as_str(),
    }
}

fn non_empty(text: String) -> Option<String> {
    Some(text).filter(|s| !s.is_empty())
}

fn timestamp(ts: Option<prost_types::Timestamp>) -> Option<Timestamp> {
    ts.map(|ts| Timestamp::from_proto(ts.seconds, ts.nanos))
}

/// Fall back to a deprecated `*_millis` field; zero means unset on the wire
fn legacy_millis(millis: i64) -> Option<Timestamp> {
    (millis != 0).then(|| Timestamp::from_millis(millis))
}

fn duration_ms(duration: Option<prost_types::Duration>) -> Option<u64> {
    duration.map(|d| {
        let millis = d
            .seconds
            .saturating_mul(1_000)
            .saturating_add(i64::from(d.nanos) / 1_000_000);
        u64::try_from(millis).unwrap_or(0)
    })
}

fn file(f: proto::File) -> File {
    let (uri, contents) = match f.file {
        Some(proto::file::File::Uri(uri)) => (non_empty(uri), None),
        Some(proto::file::File::Contents(bytes)) => (None, Some(bytes)),
        None => (None, None),
    };
    File {
        name: f.name,
        uri,
        contents,
        path_prefix: f.path_prefix,
    }
}

fn files(list: Vec<proto::File>) -> Vec<File> {
    list.into_iter().map(file).collect()
}

fn config_id(config: Option<&proto::build_event_id::ConfigurationId>) -> Option<String> {
    config.and_then(|c| non_empty(c.id.clone()))
}

/// Label carried by the id, for kinds that have one
fn id_label(id: Option<&Id>) -> Option<String> {
    match id? {
        Id::TargetCompleted(t) => non_empty(t.label.clone()),
        Id::ActionCompleted(a) => non_empty(a.label.clone()),
        Id::TestSummary(t) => non_empty(t.label.clone()),
        _ => None,
    }
}

fn convert_payload(payload: Payload, id: Option<&Id>) -> EventPayload {
    match payload {
        Payload::Progress(p) => EventPayload::Progress(Progress {
            opaque_count: match id {
                Some(Id::Progress(pid)) => pid.opaque_count,
                _ => 0,
            },
            stdout: p.stdout,
            stderr: p.stderr,
        }),
        Payload::Aborted(a) => EventPayload::Aborted(Aborted {
            reason: proto::aborted::AbortReason::try_from(a.reason)
                .unwrap_or(proto::aborted::AbortReason::Unknown)
                .name()
                .to_string(),
            description: a.description,
            subject: id_kind(id),
            label: id_label(id),
        }),
        Payload::Started(s) => EventPayload::BuildStarted(BuildStarted {
            uuid: s.uuid,
            start_time: timestamp(s.start_time).or_else(|| legacy_millis(s.start_time_millis)),
            build_tool_version: s.build_tool_version,
            options_description: s.options_description,
            command: s.command,
            working_directory: s.working_directory,
            workspace_directory: s.workspace_directory,
            server_pid: s.server_pid,
        }),
        Payload::Expanded(_) => EventPayload::Pattern(PatternExpanded {
            patterns: match id {
                Some(Id::Pattern(p)) => p.pattern.clone(),
                _ => Vec::new(),
            },
        }),
        Payload::Action(a) => {
            let (label, configuration, primary_output) = match id {
                Some(Id::ActionCompleted(aid)) => (
                    non_empty(aid.label.clone()),
                    config_id(aid.configuration.as_ref()),
                    non_empty(aid.primary_output.clone()),
                ),
                _ => (None, None, None),
            };
            let primary_output = primary_output.or_else(|| {
                a.primary_output
                    .map(file)
                    .map(|f| f.uri.clone().unwrap_or_else(|| f.display_path()))
            });
            EventPayload::ActionCompleted(ActionCompleted {
                label: label.unwrap_or(a.label),
                configuration: configuration.or_else(|| config_id(a.configuration.as_ref())),
                primary_output: primary_output.unwrap_or_default(),
                mnemonic: a.r#type,
                success: a.success,
                exit_code: Some(a.exit_code),
                stdout: a.stdout.map(file),
                stderr: a.stderr.map(file),
                command_line: a.command_line,
                start_time: timestamp(a.start_time),
                end_time: timestamp(a.end_time),
                wall_time_ms: duration_ms(a.wall_time),
                failure_message: a.failure_detail.and_then(|d| non_empty(d.message)),
            })
        }
        Payload::Completed(t) => {
            let configuration = match id {
                Some(Id::TargetCompleted(tid)) => config_id(tid.configuration.as_ref()),
                _ => None,
            };
            EventPayload::TargetCompleted(TargetCompleted {
                label: id_label(id).unwrap_or_default(),
                configuration,
                success: t.success,
                output_groups: t
                    .output_group
                    .into_iter()
                    .map(|g| OutputGroup {
                        name: g.name,
                        file_sets: g.file_sets.into_iter().map(|s| s.id).collect(),
                        incomplete: g.incomplete,
                    })
                    .collect(),
                tags: t.tag,
                failure_message: t.failure_detail.and_then(|d| non_empty(d.message)),
            })
        }
        Payload::TestSummary(t) => {
            let configuration = match id {
                Some(Id::TestSummary(tid)) => config_id(tid.configuration.as_ref()),
                _ => None,
            };
            let total_run_duration_ms = duration_ms(t.total_run_duration).or_else(|| {
                (t.total_run_duration_millis > 0).then(|| t.total_run_duration_millis as u64)
            });
            EventPayload::TestSummary(TestSummary {
                label: id_label(id).unwrap_or_default(),
                configuration,
                overall_status: TestStatus::from_i32(t.overall_status),
                total_run_count: t.total_run_count,
                run_count: t.run_count,
                attempt_count: t.attempt_count,
                shard_count: t.shard_count,
                total_num_cached: t.total_num_cached,
                passed: files(t.passed),
                failed: files(t.failed),
                first_start_time: timestamp(t.first_start_time)
                    .or_else(|| legacy_millis(t.first_start_time_millis)),
                last_stop_time: timestamp(t.last_stop_time)
                    .or_else(|| legacy_millis(t.last_stop_time_millis)),
                total_run_duration_ms,
            })
        }
        Payload::OptionsParsed(o) => EventPayload::OptionsParsed(OptionsParsed {
            startup_options: o.startup_options,
            explicit_startup_options: o.explicit_startup_options,
            cmd_line: o.cmd_line,
            explicit_cmd_line: o.explicit_cmd_line,
            tool_tag: o.tool_tag,
        }),
        Payload::Finished(f) => EventPayload::BuildFinished(BuildFinished {
            overall_success: f.overall_success,
            exit_code: f.exit_code.map(|c| ExitCode {
                name: c.name,
                code: c.code,
            }),
            finish_time: timestamp(f.finish_time).or_else(|| legacy_millis(f.finish_time_millis)),
        }),
        Payload::NamedSetOfFiles(n) => EventPayload::NamedSet(NamedSetOfFiles {
            id: match id {
                Some(Id::NamedSet(nid)) => nid.id.clone(),
                _ => String::new(),
            },
            files: files(n.files),
            file_sets: n.file_sets.into_iter().map(|s| s.id).collect(),
        }),
        Payload::WorkspaceStatus(w) => EventPayload::WorkspaceStatus(WorkspaceStatus {
            items: w.item.into_iter().map(|i| (i.key, i.value)).collect(),
        }),
        Payload::Configuration(c) => EventPayload::Configuration(Configuration {
            id: match id {
                Some(Id::Configuration(cid)) => cid.id.clone(),
                _ => String::new(),
            },
            mnemonic: c.mnemonic,
            platform_name: c.platform_name,
            cpu: c.cpu,
            make_variables: c.make_variable.into_iter().collect(),
            is_tool: c.is_tool,
        }),
        Payload::StructuredCommandLine(cmd) => {
            let label = non_empty(cmd.command_line_label).or_else(|| match id {
                Some(Id::StructuredCommandLine(cid)) => non_empty(cid.command_line_label.clone()),
                _ => None,
            });
            EventPayload::StructuredCommandLine(StructuredCommandLine {
                command_line_label: label.unwrap_or_default(),
                sections: cmd
                    .sections
                    .into_iter()
                    .map(|section| {
                        use proto::command_line_section::SectionType;
                        let args = match section.section_type {
                            Some(SectionType::ChunkList(list)) => list.chunk,
                            Some(SectionType::OptionList(list)) => list
                                .option
                                .into_iter()
                                .map(|o| o.combined_form)
                                .collect(),
                            None => Vec::new(),
                        };
                        CommandLineSection {
                            label: section.section_label,
                            args,
                        }
                    })
                    .collect(),
            })
        }
        Payload::BuildToolLogs(logs) => EventPayload::BuildToolLogs(BuildToolLogs {
            logs: files(logs.log),
        }),
        Payload::BuildMetrics(m) => {
            let actions = m.action_summary.unwrap_or_default();
            let memory = m.memory_metrics.unwrap_or_default();
            let targets = m.target_metrics.unwrap_or_default();
            let packages = m.package_metrics.unwrap_or_default();
            let timing = m.timing_metrics.unwrap_or_default();
            EventPayload::BuildMetrics(BuildMetrics {
                actions_created: actions.actions_created,
                actions_executed: actions.actions_executed,
                targets_loaded: targets.targets_loaded,
                targets_configured: targets.targets_configured,
                packages_loaded: packages.packages_loaded,
                cpu_time_ms: timing.cpu_time_in_ms,
                wall_time_ms: timing.wall_time_in_ms,
                analysis_phase_time_ms: timing.analysis_phase_time_in_ms,
                used_heap_size_post_build: memory.used_heap_size_post_build,
                peak_post_gc_heap_size: memory.peak_post_gc_heap_size,
            })
        }
        Payload::ConvenienceSymlinksIdentified(links) => {
            use proto::convenience_symlink::Action;
            EventPayload::ConvenienceSymlinks(ConvenienceSymlinks {
                symlinks: links
                    .convenience_symlinks
                    .into_iter()
                    .map(|link| ConvenienceSymlink {
                        action: match Action::try_from(link.action) {
                            Ok(Action::Create) => "CREATE",
                            Ok(Action::Delete) => "DELETE",
                            _ => "UNKNOWN",
                        }
                        .to_string(),
                        path: link.path,
                        target: link.target,
                    })
                    .collect(),
            })
        }
    }
}
