use crate::id::Id;
use crate::state::{EventKind, ProtocolState};

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    /// msgpack serialization failed.
    #[error("msgpack encode failed: {0}")]
    Encode(String),

    /// The bytes are not valid msgpack.
    #[error("msgpack decode failed: {0}")]
    Decode(String),

    /// Bytes were left over after the frame value.
    #[error("{0} trailing bytes after frame value")]
    TrailingBytes(usize),

    /// The `type` tag does not name a known frame.
    #[error("unknown frame type {0}")]
    UnknownFrameType(i64),

    /// A required field is absent.
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    /// A field has the wrong shape.
    #[error("invalid field '{field}': expected {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    /// An extension value carries an unknown type tag.
    #[error("unknown extension type {0}")]
    UnknownExtension(i8),

    /// A status or error code integer is outside its closed set.
    #[error("unknown {kind} {value}")]
    UnknownCode { kind: &'static str, value: u64 },

    /// A value cannot be represented in the header value model.
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),
}

/// Protocol violations raised by an exchange state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// The event is not legal in the current state.
    #[error("invalid frame: {event:?} not allowed in state {state:?}")]
    InvalidFrame {
        state: ProtocolState,
        event: EventKind,
    },

    /// The event belongs to a different exchange.
    #[error("invalid id: expected {expected}, got {actual}")]
    InvalidId { expected: Id, actual: Id },

    /// The exchange already ended.
    #[error("exchange {0} already ended")]
    Ended(Id),

    /// The exchange already errored.
    #[error("exchange {0} already errored")]
    Errored(Id),
}
