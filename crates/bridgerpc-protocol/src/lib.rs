//! The bridgerpc frame protocol.
//!
//! A frame is one protocol message: the start, body chunks, end or error of a
//! request or response, or a connection control message. Frames are encoded
//! as msgpack maps `{type, data}`; identifiers and codes travel as msgpack
//! extension values (see [`wire`]).
//!
//! Each exchange is validated by a [`StateMachine`]: `START`, then any number
//! of `BODY_CHUNK`s, then exactly one `END` or `ERROR`.

pub mod code;
pub mod error;
pub mod frame;
pub mod id;
pub mod state;
pub mod value;
pub mod wire;

pub use code::{RequestErrorCode, ResponseErrorCode, ResponseStatusCode};
pub use error::{CodecError, StateError};
pub use frame::{
    BodyChunk, End, ErrorFrame, Frame, FrameType, RequestFrame, RequestStart, ResponseFrame,
    ResponseStart,
};
pub use id::{Id, IdGenerator};
pub use state::{
    EventKind, ExchangeEvent, ProtocolState, RequestStateMachine, ResponseStateMachine,
    StateMachine, Transition,
};
pub use value::{Headers, Value};
