//! buildlens Event Log
//!
//! Canonical build event model and the decoders that produce it from
//! newline-delimited JSON or varint length-prefixed protobuf streams.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod binary;
pub mod decoder;
pub mod encoding;
pub mod error;
pub mod event;
pub mod json;
pub mod proto;

pub use decoder::{DecodedEvent, EventDecoder, WireFormat};
pub use encoding::{frame_record, LengthDelimitedWriter};
pub use error::DecodeError;
pub use event::{BuildEvent, EventKind, EventPayload};
pub use json::parse_line;
