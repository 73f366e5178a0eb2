//! Timestamped records for paced replay.

use crate::harness::SimError;
use buildlens_core::Timestamp;
use buildlens_log::event::{BuildEvent, EventKind, EventPayload};
use buildlens_log::{DecodeError, DecodedEvent, EventDecoder, WireFormat};
use std::path::Path;

/// One record positioned on the replay timeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedRecord {
    /// Derived event time
    pub timestamp: Timestamp,
    /// Kind of the decoded event
    pub kind: EventKind,
    /// Record bytes exactly as read, without line terminator or prefix
    pub raw: Vec<u8>,
    /// Byte offset in the source stream
    pub offset: u64,
}

/// Time an event carries on its own, if any
#[must_use]
pub fn event_time(event: &BuildEvent) -> Option<Timestamp> {
    match &event.payload {
        EventPayload::BuildStarted(started) => started.start_time,
        EventPayload::BuildFinished(finished) => finished.finish_time,
        EventPayload::ActionCompleted(action) => match (action.start_time, action.wall_time_ms) {
            (Some(start), Some(wall)) => Some(start.add_millis(wall)),
            _ => action.end_time.or(action.start_time),
        },
        EventPayload::TestSummary(summary) => summary.last_stop_time,
        _ => None,
    }
}

/// Order decoded events for replay.
///
/// Events without their own time inherit the last time seen before them,
/// or zero at the head of the stream. The sort is stable, so records with
/// equal times keep their stream order.
#[must_use]
pub fn build_timeline(events: Vec<DecodedEvent>) -> Vec<TimedRecord> {
    let mut last = Timestamp::zero();
    let mut timeline: Vec<TimedRecord> = events
        .into_iter()
        .map(|decoded| {
            if let Some(time) = event_time(&decoded.event) {
                last = time;
            }
            TimedRecord {
                timestamp: last,
                kind: decoded.event.kind(),
                raw: decoded.raw,
                offset: decoded.offset,
            }
        })
        .collect();
    timeline.sort_by_key(|record| record.timestamp);
    timeline
}

/// A decoded file ready for replay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedTimeline {
    /// Detected or forced wire format
    pub format: WireFormat,
    /// Records in replay order
    pub records: Vec<TimedRecord>,
    /// Fatal error that ended decoding early; `records` holds what came before
    pub error: Option<DecodeError>,
}

/// Decode a whole file into a timeline.
///
/// A fatal decode error, such as a truncated binary tail, stops decoding and
/// is returned alongside the records read before it.
///
/// # Errors
///
/// Returns error if the file cannot be opened
pub fn load_timeline(path: &Path, format: Option<WireFormat>) -> Result<LoadedTimeline, SimError> {
    let mut decoder = EventDecoder::open(path, format).map_err(|e| SimError::Open {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let format = decoder.format();

    let mut events = Vec::new();
    let mut error = None;
    for item in decoder.by_ref() {
        match item {
            Ok(decoded) => events.push(decoded),
            Err(e) => {
                tracing::warn!(path = %path.display(), records = events.len(), error = %e, "Input ends early");
                error = Some(e);
                break;
            }
        }
    }
    tracing::debug!(path = %path.display(), records = events.len(), %format, "Loaded timeline");

    Ok(LoadedTimeline {
        format,
        records: build_timeline(events),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildlens_log::event::{ActionCompleted, BuildFinished, BuildStarted, Progress, TestSummary};

    fn decoded(payload: EventPayload, offset: u64) -> DecodedEvent {
        DecodedEvent {
            event: BuildEvent::new(payload),
            raw: offset.to_string().into_bytes(),
            offset,
        }
    }

    fn ms(millis: i64) -> Option<Timestamp> {
        Some(Timestamp::from_millis(millis))
    }

    #[test]
    fn test_event_times() {
        let action = ActionCompleted {
            start_time: ms(1_000),
            wall_time_ms: Some(250),
            end_time: ms(9_999),
            ..ActionCompleted::default()
        };
        let event = BuildEvent::new(EventPayload::ActionCompleted(action.clone()));
        assert_eq!(event_time(&event), ms(1_250));

        let fallback = BuildEvent::new(EventPayload::ActionCompleted(ActionCompleted {
            wall_time_ms: None,
            ..action
        }));
        assert_eq!(event_time(&fallback), ms(9_999));

        let progress = BuildEvent::new(EventPayload::Progress(Progress::default()));
        assert_eq!(event_time(&progress), None);
    }

    #[test]
    fn test_timeline_inherits_and_sorts() {
        let events = vec![
            decoded(EventPayload::Progress(Progress::default()), 0),
            decoded(
                EventPayload::BuildStarted(BuildStarted {
                    start_time: ms(100),
                    ..BuildStarted::default()
                }),
                1,
            ),
            decoded(
                EventPayload::TestSummary(TestSummary {
                    last_stop_time: ms(900),
                    ..TestSummary::default()
                }),
                2,
            ),
            decoded(
                EventPayload::ActionCompleted(ActionCompleted {
                    end_time: ms(500),
                    ..ActionCompleted::default()
                }),
                3,
            ),
            decoded(EventPayload::Progress(Progress::default()), 4),
            decoded(
                EventPayload::BuildFinished(BuildFinished {
                    finish_time: ms(1_000),
                    ..BuildFinished::default()
                }),
                5,
            ),
        ];

        let timeline = build_timeline(events);
        let order: Vec<(u64, i64)> = timeline
            .iter()
            .map(|r| (r.offset, r.timestamp.as_millis()))
            .collect();
        assert_eq!(
            order,
            vec![(0, 0), (1, 100), (3, 500), (4, 500), (2, 900), (5, 1_000)]
        );
        assert_eq!(timeline[0].kind, EventKind::Progress);
        assert_eq!(timeline[1].raw, b"1".to_vec());
    }
}
