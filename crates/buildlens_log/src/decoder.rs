//! Streaming event decoder over both wire formats.

use crate::binary::{self, MAX_FRAME_BYTES};
use crate::error::DecodeError;
use crate::event::BuildEvent;
use crate::json;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufRead, BufReader, ErrorKind};
use std::iter::FusedIterator;
use std::path::Path;

/// Characters of a malformed line kept in the warning
const PREVIEW_CHARS: usize = 120;

/// Wire encoding of an event stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// One JSON object per line
    JsonLines,
    /// Varint length-prefixed protobuf records
    Binary,
}

impl WireFormat {
    /// Guess the format from a file extension
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" | "jsonl" | "ndjson" => Some(Self::JsonLines),
            "bin" | "pb" | "bep" | "binpb" => Some(Self::Binary),
            _ => None,
        }
    }

    /// Guess the format from the first non-whitespace byte without consuming
    /// anything. An empty or all-whitespace head is treated as JSON.
    ///
    /// # Errors
    ///
    /// Returns error if the reader fails
    pub fn sniff<R: BufRead>(reader: &mut R) -> io::Result<Self> {
        let head = reader.fill_buf()?;
        Ok(match head.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') | None => Self::JsonLines,
            Some(_) => Self::Binary,
        })
    }

    /// Get the format name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::JsonLines => "json",
            Self::Binary => "binary",
        }
    }
}

impl std::fmt::Display for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "jsonl" | "ndjson" => Ok(Self::JsonLines),
            "binary" | "bin" | "proto" | "protobuf" => Ok(Self::Binary),
            other => Err(format!("unknown wire format '{}', expected json or binary", other)),
        }
    }
}

/// A decoded event with its raw record bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    /// Canonical event
    pub event: BuildEvent,
    /// JSON line without terminator, or protobuf message without prefix
    pub raw: Vec<u8>,
    /// Byte offset of the record in the stream
    pub offset: u64,
}

/// Lazy decoder over a byte source.
///
/// Restarting means constructing a new decoder on a fresh reader. JSON
/// streams skip malformed lines; binary streams stop at the first bad frame
/// and the iterator is fused afterwards.
pub struct EventDecoder<R> {
    reader: R,
    format: WireFormat,
    max_frame_bytes: u64,
    offset: u64,
    line: u64,
    records: u64,
    skipped: u64,
    finished: bool,
}

impl<R: BufRead> EventDecoder<R> {
    /// Create a new decoder
    pub fn new(reader: R, format: WireFormat) -> Self {
        Self {
            reader,
            format,
            max_frame_bytes: MAX_FRAME_BYTES,
            offset: 0,
            line: 0,
            records: 0,
            skipped: 0,
            finished: false,
        }
    }

    /// Create a decoder, sniffing the format from the stream head
    ///
    /// # Errors
    ///
    /// Returns error if the reader fails
    pub fn sniffed(mut reader: R) -> io::Result<Self> {
        let format = WireFormat::sniff(&mut reader)?;
        Ok(Self::new(reader, format))
    }

    /// Set the binary frame size limit
    #[must_use]
    pub fn with_max_frame_bytes(mut self, limit: u64) -> Self {
        self.max_frame_bytes = limit;
        self
    }

    /// Get the wire format
    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Events yielded so far
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Malformed JSON lines skipped so far
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Bytes consumed so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn next_json(&mut self) -> Option<Result<DecodedEvent, DecodeError>> {
        loop {
            let start = self.offset;
            let mut line = Vec::new();
            match self.reader.read_until(b'\n', &mut line) {
                Ok(0) => {
                    self.finished = true;
                    return None;
                }
                Ok(n) => {
                    self.offset += n as u64;
                    self.line += 1;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.finished = true;
                    return Some(Err(DecodeError::Io {
                        offset: start,
                        message: err.to_string(),
                    }));
                }
            }

            while matches!(line.last(), Some(b'\n' | b'\r')) {
                line.pop();
            }

            let parsed = match std::str::from_utf8(&line) {
                Ok(text) => json::parse_line(text),
                Err(err) => Err(DecodeError::MalformedLine {
                    line: 0,
                    reason: format!("invalid UTF-8: {}", err),
                }),
            };

            match parsed {
                Ok(None) => continue,
                Ok(Some(event)) => {
                    self.records += 1;
                    return Some(Ok(DecodedEvent {
                        event,
                        raw: line,
                        offset: start,
                    }));
                }
                Err(err) => {
                    let err = err.at_line(self.line);
                    self.skipped += 1;
                    tracing::warn!(
                        line = self.line,
                        content = %preview(&String::from_utf8_lossy(&line)),
                        error = %err,
                        "Skipping malformed event record"
                    );
                }
            }
        }
    }

    fn next_binary(&mut self) -> Option<Result<DecodedEvent, DecodeError>> {
        let start = self.offset;
        let frame = match binary::read_frame(&mut self.reader, start, self.max_frame_bytes) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.finished = true;
                return None;
            }
            Err(err) => return Some(Err(self.fail(err))),
        };
        self.offset += (frame.prefix_len + frame.body.len()) as u64;

        match binary::decode_event(&frame.body, start) {
            Ok(event) => {
                self.records += 1;
                Some(Ok(DecodedEvent {
                    event,
                    raw: frame.body,
                    offset: start,
                }))
            }
            Err(err) => Some(Err(self.fail(err))),
        }
    }

    fn fail(&mut self, err: DecodeError) -> DecodeError {
        self.finished = true;
        tracing::error!(
            offset = self.offset,
            records = self.records,
            error = %err,
            "Binary event stream is unreadable past this point"
        );
        err
    }
}

impl EventDecoder<BufReader<fs::File>> {
    /// Open a file, taking the format from the argument, the extension, or
    /// the first byte, in that order
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or read
    pub fn open(path: &Path, format: Option<WireFormat>) -> io::Result<Self> {
        let mut reader = BufReader::new(fs::File::open(path)?);
        let format = match format.or_else(|| WireFormat::from_path(path)) {
            Some(format) => format,
            None => WireFormat::sniff(&mut reader)?,
        };
        tracing::debug!(path = %path.display(), %format, "Opened event stream");
        Ok(Self::new(reader, format))
    }
}

impl<R: BufRead> Iterator for EventDecoder<R> {
    type Item = Result<DecodedEvent, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.format {
            WireFormat::JsonLines => self.next_json(),
            WireFormat::Binary => self.next_binary(),
        }
    }
}

impl<R: BufRead> FusedIterator for EventDecoder<R> {}

/// First `PREVIEW_CHARS` characters of a line
fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{frame_record, LengthDelimitedWriter};
    use crate::event::{EventKind, EventPayload};
    use crate::proto;
    use prost::Message;
    use std::io::Cursor;

    const STARTED: &str = r#"{"id":{"started":{}},"started":{"uuid":"u","startTimeMillis":"0"}}"#;
    const FINISHED: &str =
        r#"{"id":{"buildFinished":{}},"finished":{"overallSuccess":true,"finishTimeMillis":"600"},"lastMessage":true}"#;

    fn proto_started() -> proto::BuildEvent {
        proto::BuildEvent {
            id: Some(proto::BuildEventId {
                id: Some(proto::build_event_id::Id::Started(
                    proto::build_event_id::BuildStartedId {},
                )),
            }),
            payload: Some(proto::build_event::Payload::Started(proto::BuildStarted {
                uuid: "u".into(),
                ..Default::default()
            })),
            ..Default::default()
        }
    }

    #[test]
    fn test_json_skips_blank_and_malformed_lines() {
        let input = format!("{}\n\n   \n{{broken\n[1]\n{}\n", STARTED, FINISHED);
        let mut decoder = EventDecoder::new(Cursor::new(input), WireFormat::JsonLines);
        let events: Vec<_> = decoder.by_ref().collect::<Result<_, _>>().unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event.kind(), EventKind::BuildStarted);
        assert_eq!(events[0].raw, STARTED.as_bytes());
        assert_eq!(events[0].offset, 0);
        assert!(events[1].event.is_terminus());
        assert_eq!(decoder.skipped(), 2);
        assert_eq!(decoder.records(), 2);
    }

    #[test]
    fn test_json_crlf_and_invalid_utf8() {
        let mut input = format!("{}\r\n", STARTED).into_bytes();
        input.extend_from_slice(b"\xff\xfe\n");
        input.extend_from_slice(FINISHED.as_bytes());

        let mut decoder = EventDecoder::new(Cursor::new(input), WireFormat::JsonLines);
        let first = decoder.next().unwrap().unwrap();
        assert_eq!(first.raw, STARTED.as_bytes());

        // Last line without a terminator still decodes
        let second = decoder.next().unwrap().unwrap();
        assert_eq!(second.event.kind(), EventKind::BuildFinished);
        assert!(decoder.next().is_none());
        assert_eq!(decoder.skipped(), 1);
    }

    #[test]
    fn test_binary_stream() {
        let mut writer = LengthDelimitedWriter::new(Vec::new());
        writer.write_message(&proto_started()).unwrap();
        writer.write_message(&proto_started()).unwrap();
        let bytes = writer.into_inner();
        let total = bytes.len() as u64;

        let mut decoder = EventDecoder::new(Cursor::new(bytes), WireFormat::Binary);
        let events: Vec<_> = decoder.by_ref().collect::<Result<_, _>>().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].offset, 0);
        assert_eq!(events[0].raw, proto_started().encode_to_vec());
        assert_eq!(decoder.offset(), total);
        let EventPayload::BuildStarted(started) = &events[1].event.payload else {
            panic!("expected build started");
        };
        assert_eq!(started.uuid, "u");
    }

    #[test]
    fn test_binary_corruption_is_fatal_and_fused() {
        let mut bytes = frame_record(&proto_started().encode_to_vec());
        bytes.extend_from_slice(&frame_record(&[0xFF, 0xFF, 0xFF]));
        bytes.extend_from_slice(&frame_record(&proto_started().encode_to_vec()));

        let mut decoder = EventDecoder::new(Cursor::new(bytes), WireFormat::Binary);
        assert!(decoder.next().unwrap().is_ok());
        let err = decoder.next().unwrap().unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, DecodeError::Protobuf { .. }));
        assert!(decoder.next().is_none());
        assert!(decoder.next().is_none());
    }

    #[test]
    fn test_binary_truncated_tail() {
        let mut bytes = frame_record(&proto_started().encode_to_vec());
        let mut second = frame_record(&proto_started().encode_to_vec());
        second.truncate(second.len() - 1);
        bytes.extend_from_slice(&second);

        let results: Vec<_> = EventDecoder::new(Cursor::new(bytes), WireFormat::Binary).collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[1], Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn test_frame_limit() {
        let bytes = frame_record(&proto_started().encode_to_vec());
        let mut decoder =
            EventDecoder::new(Cursor::new(bytes), WireFormat::Binary).with_max_frame_bytes(2);
        assert!(matches!(
            decoder.next(),
            Some(Err(DecodeError::FrameTooLarge { .. }))
        ));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            WireFormat::from_path(Path::new("build.JSON")),
            Some(WireFormat::JsonLines)
        );
        assert_eq!(WireFormat::from_path(Path::new("events.bep")), Some(WireFormat::Binary));
        assert_eq!(WireFormat::from_path(Path::new("events")), None);

        let mut json = Cursor::new(b"  \n{\"id\":{}}".to_vec());
        assert_eq!(WireFormat::sniff(&mut json).unwrap(), WireFormat::JsonLines);
        assert_eq!(json.position(), 0);

        let mut binary = Cursor::new(vec![0x0A, 0x02]);
        assert_eq!(WireFormat::sniff(&mut binary).unwrap(), WireFormat::Binary);

        assert_eq!("ndjson".parse::<WireFormat>().unwrap(), WireFormat::JsonLines);
        assert!("xml".parse::<WireFormat>().is_err());
    }

    #[test]
    fn test_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events");
        std::fs::write(&path, format!("{}\n{}\n", STARTED, FINISHED)).unwrap();

        let decoder = EventDecoder::open(&path, None).unwrap();
        assert_eq!(decoder.format(), WireFormat::JsonLines);
        assert_eq!(decoder.count(), 2);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(200);
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }
}
