//! Paced replay of a recorded event stream into a writer.

use crate::record::{load_timeline, LoadedTimeline, TimedRecord};
use buildlens_log::{frame_record, DecodeError, WireFormat};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Simulator errors
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Input could not be opened
    #[error("Cannot open {path}: {message}")]
    Open {
        /// Input path
        path: String,
        /// I/O error text
        message: String,
    },

    /// Input stream could not be decoded
    #[error("Cannot decode input: {0}")]
    Decode(#[from] DecodeError),

    /// Writing to the sink failed
    #[error("Write failed: {0}")]
    Io(#[from] std::io::Error),

    /// Pacing parameters are unusable
    #[error("Invalid pacing: {0}")]
    InvalidPacing(String),
}

/// Delay policy between consecutive records
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    /// Recorded gaps divided by `speed`, capped at `max_delay`
    Scaled {
        /// Playback speed multiplier; infinity replays without delay
        speed: f64,
        /// Longest single pause
        max_delay: Duration,
    },
    /// Same pause between every pair of records
    Fixed {
        /// Pause length
        interval: Duration,
    },
}

impl Default for Pacing {
    fn default() -> Self {
        Self::Scaled {
            speed: 1.0,
            max_delay: Duration::from_secs(2),
        }
    }
}

impl Pacing {
    /// Check the parameters
    ///
    /// # Errors
    ///
    /// Returns error if the speed is not a positive number
    pub fn validate(&self) -> Result<(), SimError> {
        match self {
            Self::Scaled { speed, .. } if speed.is_nan() || *speed <= 0.0 => Err(
                SimError::InvalidPacing(format!("speed must be positive, got {}", speed)),
            ),
            _ => Ok(()),
        }
    }

    /// Pause before a record `gap_ms` after the previous one
    #[must_use]
    pub fn delay(&self, gap_ms: u64) -> Duration {
        match *self {
            Self::Scaled { speed, max_delay } => {
                if speed.is_infinite() {
                    return Duration::ZERO;
                }
                Duration::try_from_secs_f64((gap_ms as f64 / 1000.0) / speed)
                    .map_or(max_delay, |scaled| scaled.min(max_delay))
            }
            Self::Fixed { interval } => interval,
        }
    }
}

/// Simulator configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimConfig {
    /// Delay policy
    pub pacing: Pacing,
    /// Input format override
    pub format: Option<WireFormat>,
}

impl SimConfig {
    /// Create a new config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pacing
    #[must_use]
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Force the input format
    #[must_use]
    pub fn with_format(mut self, format: WireFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// Outcome of one replay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimReport {
    /// Records fully written
    pub records: u64,
    /// Bytes written, including terminators and prefixes
    pub bytes: u64,
    /// Wall time spent
    pub elapsed: Duration,
    /// Stopped by the cancellation token
    pub cancelled: bool,
    /// Fatal error that cut the input short; the records before it were replayed
    pub input_error: Option<DecodeError>,
}

/// Writes a timeline to a sink at a controlled pace
#[derive(Debug, Clone, Default)]
pub struct StreamSimulator {
    config: SimConfig,
}

impl StreamSimulator {
    /// Create a new simulator
    ///
    /// # Errors
    ///
    /// Returns error if the pacing is invalid
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.pacing.validate()?;
        Ok(Self { config })
    }

    /// Get the config
    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Encode one record for the wire
    #[must_use]
    pub fn frame(record: &TimedRecord, format: WireFormat) -> Vec<u8> {
        match format {
            WireFormat::JsonLines => {
                let mut line = Vec::with_capacity(record.raw.len() + 1);
                line.extend_from_slice(&record.raw);
                line.push(b'\n');
                line
            }
            WireFormat::Binary => frame_record(&record.raw),
        }
    }

    /// Replay `timeline` into `sink`.
    ///
    /// Every record is written and flushed before the next delay starts, so
    /// a sink that stops accepting bytes holds the simulator back.
    ///
    /// # Errors
    ///
    /// Returns error if the sink fails
    pub async fn replay<W>(
        &self,
        timeline: &[TimedRecord],
        format: WireFormat,
        sink: &mut W,
        cancel: &CancellationToken,
    ) -> Result<SimReport, SimError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let started = Instant::now();
        let mut report = SimReport {
            records: 0,
            bytes: 0,
            elapsed: Duration::ZERO,
            cancelled: false,
            input_error: None,
        };
        let mut previous = None;

        for record in timeline {
            if let Some(prev) = previous {
                let delay = self.config.pacing.delay(record.timestamp.millis_since(&prev));
                if !delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            report.cancelled = true;
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
            previous = Some(record.timestamp);

            let bytes = Self::frame(record, format);
            let written = tokio::select! {
                _ = cancel.cancelled() => None,
                result = async {
                    sink.write_all(&bytes).await?;
                    sink.flush().await
                } => Some(result),
            };
            match written {
                Some(result) => result?,
                None => {
                    report.cancelled = true;
                    break;
                }
            }

            report.records += 1;
            report.bytes += bytes.len() as u64;
            tracing::trace!(kind = %record.kind, offset = record.offset, "Replayed record");
        }

        report.elapsed = started.elapsed();
        tracing::info!(
            records = report.records,
            bytes = report.bytes,
            cancelled = report.cancelled,
            "Replay finished"
        );
        Ok(report)
    }

    /// Replay `input` into a newly created `output` in the same format.
    ///
    /// When the input ends in a fatal decode error, the records before it are
    /// still replayed and the error is returned in [`SimReport::input_error`].
    ///
    /// # Errors
    ///
    /// Returns error if either file cannot be opened or writing fails
    pub async fn replay_file(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<SimReport, SimError> {
        let LoadedTimeline {
            format,
            records,
            error,
        } = load_timeline(input, self.config.format)?;
        let mut file = tokio::fs::File::create(output).await?;
        tracing::info!(
            input = %input.display(),
            output = %output.display(),
            records = records.len(),
            %format,
            "Starting replay"
        );
        let mut report = self.replay(&records, format, &mut file, cancel).await?;
        report.input_error = error;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildlens_core::Timestamp;
    use buildlens_log::event::EventKind;
    use buildlens_log::{proto, EventDecoder, LengthDelimitedWriter};
    use std::io::{BufReader, Write};
    use tokio::io::AsyncReadExt;

    const EVENTS: &str = r#"{"id":{"started":{}},"started":{"uuid":"sim","startTime":"2024-01-01T00:00:00Z","command":"build"}}
{"id":{"progress":{"opaqueCount":0}},"progress":{"stderr":"[0 / 1] checking cached actions\n"}}
{"id":{"buildFinished":{}},"finished":{"overallSuccess":true,"finishTime":"2024-01-01T00:00:00.040Z","exitCode":{"name":"SUCCESS","code":0}}}
"#;

    fn record(ms: i64, raw: &[u8]) -> TimedRecord {
        TimedRecord {
            timestamp: Timestamp::from_millis(ms),
            kind: EventKind::Progress,
            raw: raw.to_vec(),
            offset: 0,
        }
    }

    fn fast() -> StreamSimulator {
        StreamSimulator::new(SimConfig::new().with_pacing(Pacing::Scaled {
            speed: f64::INFINITY,
            max_delay: Duration::from_secs(1),
        }))
        .unwrap()
    }

    #[test]
    fn test_pacing_delay() {
        let scaled = Pacing::Scaled {
            speed: 2.0,
            max_delay: Duration::from_millis(300),
        };
        assert_eq!(scaled.delay(400), Duration::from_millis(200));
        assert_eq!(scaled.delay(10_000), Duration::from_millis(300));
        assert_eq!(scaled.delay(0), Duration::ZERO);

        let fixed = Pacing::Fixed {
            interval: Duration::from_millis(7),
        };
        assert_eq!(fixed.delay(99_999), Duration::from_millis(7));

        let instant = Pacing::Scaled {
            speed: f64::INFINITY,
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(instant.delay(u64::MAX), Duration::ZERO);
    }

    #[test]
    fn test_invalid_speed() {
        for speed in [0.0, -1.0, f64::NAN] {
            let config = SimConfig::new().with_pacing(Pacing::Scaled {
                speed,
                max_delay: Duration::from_secs(1),
            });
            assert!(matches!(
                StreamSimulator::new(config),
                Err(SimError::InvalidPacing(_))
            ));
        }
    }

    #[test]
    fn test_frame() {
        let rec = record(0, b"abc");
        assert_eq!(StreamSimulator::frame(&rec, WireFormat::JsonLines), b"abc\n".to_vec());
        assert_eq!(
            StreamSimulator::frame(&rec, WireFormat::Binary),
            vec![3, b'a', b'b', b'c']
        );
    }

    #[tokio::test]
    async fn test_replay_file_reproduces_stream() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.json");
        let output = dir.path().join("out.json");
        std::fs::File::create(&input)
            .unwrap()
            .write_all(EVENTS.as_bytes())
            .unwrap();

        let report = fast()
            .replay_file(&input, &output, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.records, 3);
        assert!(!report.cancelled);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), EVENTS);

        let reader = BufReader::new(std::fs::File::open(&output).unwrap());
        let replayed = EventDecoder::new(reader, WireFormat::JsonLines).count();
        assert_eq!(replayed, 3);
    }

    #[tokio::test]
    async fn test_replay_file_orders_by_event_time() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("shuffled.json");
        let output = dir.path().join("ordered.json");
        std::fs::write(
            &input,
            r#"{"id":{"buildFinished":{}},"finished":{"overallSuccess":true,"finishTime":"1970-01-01T00:00:02Z"}}
{"id":{"started":{}},"started":{"uuid":"s","startTime":"1970-01-01T00:00:01Z","command":"build"}}
{"id":{"progress":{"opaqueCount":0}},"progress":{"stderr":"working"}}
"#,
        )
        .unwrap();

        let report = fast()
            .replay_file(&input, &output, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.records, 3);
        assert_eq!(report.input_error, None);

        let reader = BufReader::new(std::fs::File::open(&output).unwrap());
        let kinds: Vec<EventKind> = EventDecoder::new(reader, WireFormat::JsonLines)
            .map(|decoded| decoded.unwrap().event.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![EventKind::BuildStarted, EventKind::Progress, EventKind::BuildFinished]
        );
    }

    #[tokio::test]
    async fn test_truncated_binary_replays_prefix() {
        let started = proto::BuildEvent {
            id: Some(proto::BuildEventId {
                id: Some(proto::build_event_id::Id::Started(
                    proto::build_event_id::BuildStartedId {},
                )),
            }),
            payload: Some(proto::build_event::Payload::Started(proto::BuildStarted {
                uuid: "cut".into(),
                ..proto::BuildStarted::default()
            })),
            ..proto::BuildEvent::default()
        };
        let mut writer = LengthDelimitedWriter::new(Vec::new());
        writer.write_message(&started).unwrap();
        let mut bytes = writer.into_inner();
        let whole = bytes.clone();
        bytes.extend_from_slice(&[0x20, 0x01, 0x02]);

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("cut.bin");
        let output = dir.path().join("out.bin");
        std::fs::write(&input, &bytes).unwrap();

        let report = fast()
            .replay_file(&input, &output, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.records, 1);
        assert!(matches!(report.input_error, Some(DecodeError::Truncated { .. })));
        assert_eq!(std::fs::read(&output).unwrap(), whole);
    }

    #[tokio::test]
    async fn test_scaled_pacing_waits() {
        let timeline = vec![record(0, b"a"), record(40, b"b"), record(80, b"c")];
        let simulator = StreamSimulator::new(SimConfig::new().with_pacing(Pacing::Scaled {
            speed: 1.0,
            max_delay: Duration::from_secs(1),
        }))
        .unwrap();

        let mut out = Vec::new();
        let report = simulator
            .replay(&timeline, WireFormat::JsonLines, &mut out, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(out, b"a\nb\nc\n".to_vec());
        assert_eq!(report.bytes, 6);
        assert!(report.elapsed >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_slow_sink_suspends_simulator() {
        let timeline: Vec<TimedRecord> = (0..8).map(|i| record(i, &[b'x'; 40])).collect();
        let expected: usize = timeline.len() * 41;
        let (mut writer, mut reader) = tokio::io::duplex(64);

        let simulator = fast();
        let task = tokio::spawn(async move {
            let report = simulator
                .replay(&timeline, WireFormat::JsonLines, &mut writer, &CancellationToken::new())
                .await;
            drop(writer);
            report
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());

        let mut received = Vec::new();
        reader.read_to_end(&mut received).await.unwrap();
        let report = task.await.unwrap().unwrap();

        assert_eq!(received.len(), expected);
        assert_eq!(report.records, 8);
    }

    #[tokio::test]
    async fn test_cancel_during_delay() {
        let timeline = vec![record(0, b"a"), record(60_000, b"b")];
        let simulator = StreamSimulator::new(SimConfig::new().with_pacing(Pacing::Fixed {
            interval: Duration::from_secs(60),
        }))
        .unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let mut out = Vec::new();
        let report = simulator
            .replay(&timeline, WireFormat::JsonLines, &mut out, &cancel)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.records, 1);
        assert_eq!(out, b"a\n".to_vec());
    }
}
