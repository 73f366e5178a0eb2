//! Length-delimited framing for binary event streams.
//!
//! Each record is written as a base-128 varint byte length followed by the
//! record bytes, the same framing `binary` reads back.

use prost::Message;
use std::io::{self, Write};

/// Append the varint encoding of `value` to `buf`
pub fn encode_varint(mut value: u64, buf: &mut Vec<u8>) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Number of bytes `encode_varint` produces for `value`
#[must_use]
pub const fn varint_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Prefix a record body with its varint length
#[must_use]
pub fn frame_record(body: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(varint_len(body.len() as u64) + body.len());
    encode_varint(body.len() as u64, &mut framed);
    framed.extend_from_slice(body);
    framed
}

/// Writer producing a length-delimited record stream
pub struct LengthDelimitedWriter<W> {
    writer: W,
    records: u64,
    bytes: u64,
}

impl<W: Write> LengthDelimitedWriter<W> {
    /// Create a new writer
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            records: 0,
            bytes: 0,
        }
    }

    /// Write one already-serialized record
    ///
    /// # Errors
    ///
    /// Returns error if the underlying writer fails
    pub fn write_record(&mut self, body: &[u8]) -> io::Result<()> {
        let framed = frame_record(body);
        self.writer.write_all(&framed)?;
        self.records += 1;
        self.bytes += framed.len() as u64;
        Ok(())
    }

    /// Serialize and write one protobuf message
    ///
    /// # Errors
    ///
    /// Returns error if the underlying writer fails
    pub fn write_message<M: Message>(&mut self, message: &M) -> io::Result<()> {
        self.write_record(&message.encode_to_vec())
    }

    /// Records written so far
    #[must_use]
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Bytes written so far, prefixes included
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Flush the writer
    ///
    /// # Errors
    ///
    /// Returns error if the underlying writer fails
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Consume and return the inner writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::read_varint;
    use proptest::prelude::*;
    use std::io::Cursor;

    #[test]
    fn test_encode_varint_known_values() {
        let mut buf = Vec::new();
        encode_varint(1, &mut buf);
        assert_eq!(buf, vec![0x01]);

        buf.clear();
        encode_varint(300, &mut buf);
        assert_eq!(buf, vec![0xAC, 0x02]);
    }

    #[test]
    fn test_frame_record() {
        assert_eq!(frame_record(b"abc"), vec![3, b'a', b'b', b'c']);
        assert_eq!(frame_record(&[]), vec![0]);
    }

    #[test]
    fn test_writer_counts() {
        let mut writer = LengthDelimitedWriter::new(Vec::new());
        writer.write_record(b"hello").unwrap();
        writer.write_record(&[0u8; 200]).unwrap();
        writer.flush().unwrap();

        assert_eq!(writer.records(), 2);
        assert_eq!(writer.bytes(), 6 + 202);
        assert_eq!(writer.into_inner().len(), 208);
    }

    #[test]
    fn test_write_message_matches_prost_framing() {
        let message = prost_types::Duration { seconds: 5, nanos: 0 };
        let mut writer = LengthDelimitedWriter::new(Vec::new());
        writer.write_message(&message).unwrap();
        assert_eq!(writer.into_inner(), message.encode_length_delimited_to_vec());
    }

    proptest! {
        #[test]
        fn prop_varint_len_matches_encoding(value in any::<u64>()) {
            let mut buf = Vec::new();
            encode_varint(value, &mut buf);
            prop_assert_eq!(buf.len(), varint_len(value));

            let mut cursor = Cursor::new(buf);
            prop_assert_eq!(read_varint(&mut cursor, 0).unwrap(), Some((value, varint_len(value))));
        }
    }
}
