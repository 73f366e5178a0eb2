//! Decode errors.

/// Error produced while decoding an event stream
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Underlying read failed
    #[error("I/O error at byte {offset}: {message}")]
    Io {
        /// Stream offset of the failed read
        offset: u64,
        /// Error text from the reader
        message: String,
    },

    /// Stream ended inside a length prefix or record body
    #[error("Truncated record at byte {offset}: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Offset of the record
        offset: u64,
        /// Bytes announced
        expected: u64,
        /// Bytes available
        actual: u64,
    },

    /// Length prefix longer than ten bytes or above u64
    #[error("Varint overflow in length prefix at byte {offset}")]
    VarintOverflow {
        /// Offset of the prefix
        offset: u64,
    },

    /// Length prefix above the frame limit
    #[error("Frame of {len} bytes at byte {offset} exceeds the {limit} byte limit")]
    FrameTooLarge {
        /// Offset of the prefix
        offset: u64,
        /// Announced length
        len: u64,
        /// Configured limit
        limit: u64,
    },

    /// Record bytes are not a valid protobuf event
    #[error("Protobuf decode failed at byte {offset}: {message}")]
    Protobuf {
        /// Offset of the record
        offset: u64,
        /// prost error text
        message: String,
    },

    /// A JSON line could not be normalized into an event
    #[error("Malformed record on line {line}: {reason}")]
    MalformedLine {
        /// 1-based line number (0 when parsed outside a decoder)
        line: u64,
        /// Why the line was rejected
        reason: String,
    },
}

impl DecodeError {
    /// Check whether the error ends the stream.
    ///
    /// Only a malformed JSON line is recoverable; a binary stream cannot
    /// resynchronize after a bad frame.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::MalformedLine { .. })
    }

    /// Attach a line number to a malformed line error
    #[must_use]
    pub fn at_line(self, line: u64) -> Self {
        match self {
            Self::MalformedLine { reason, .. } => Self::MalformedLine { line, reason },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(DecodeError::VarintOverflow { offset: 0 }.is_fatal());
        assert!(
            DecodeError::Truncated { offset: 4, expected: 10, actual: 3 }.is_fatal()
        );
        assert!(!DecodeError::MalformedLine { line: 3, reason: "x".into() }.is_fatal());
    }

    #[test]
    fn test_at_line() {
        let err = DecodeError::MalformedLine { line: 0, reason: "not an object".into() }.at_line(7);
        assert_eq!(err.to_string(), "Malformed record on line 7: not an object");

        let io = DecodeError::Io { offset: 1, message: "boom".into() };
        assert_eq!(io.clone().at_line(9), io);
    }
}
