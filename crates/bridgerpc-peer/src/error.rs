use std::time::Duration;

use bridgerpc_protocol::{Id, RequestErrorCode, ResponseErrorCode};

/// Errors raised by the session registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The id is already registered as a request or response session.
    #[error("session id {0} already in use")]
    SessionIdInUse(Id),
}

/// Errors that can occur in engine operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] bridgerpc_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] bridgerpc_frame::FrameError),

    /// Wire codec error.
    #[error("codec error: {0}")]
    Codec(#[from] bridgerpc_protocol::CodecError),

    /// Frame order violation for an exchange.
    #[error("protocol violation: {0}")]
    Protocol(#[from] bridgerpc_protocol::StateError),

    /// Session registry error.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// The remote side failed the response.
    #[error("remote response error {code}: {message}")]
    Remote {
        code: ResponseErrorCode,
        message: String,
    },

    /// The remote side failed the request.
    #[error("remote request error {code}: {message}")]
    RequestFailed {
        code: RequestErrorCode,
        message: String,
    },

    /// A service failed while handling a request.
    #[error("handler failed: {0}")]
    Handler(String),

    /// Request timed out.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The engine is stopped.
    #[error("engine stopped")]
    Stopped,

    /// The exchange was closed before it completed.
    #[error("exchange closed")]
    Closed,
}

impl PeerError {
    /// Build a handler failure from any displayable error.
    pub fn handler(err: impl std::fmt::Display) -> Self {
        PeerError::Handler(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
