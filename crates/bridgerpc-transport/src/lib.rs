//! Byte-stream transports for bridgerpc.
//!
//! A transport moves opaque byte chunks between two endpoints. Chunks are not
//! frame-aligned: the framing layer reassembles them.
//!
//! - [`DuplexTransport`]: in-process loopback pair
//! - [`StreamTransport`]: any tokio `AsyncRead + AsyncWrite` (pipes, sockets)
//! - [`UnixSocketListener`]: accept/connect helpers for Unix domain sockets

pub mod duplex;
pub mod error;
pub mod stream;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use duplex::DuplexTransport;
pub use error::{Result, TransportError};
pub use stream::StreamTransport;
pub use traits::{ReceiveListener, ReceiverSet, SendFuture, Transport};

#[cfg(unix)]
pub use uds::UnixSocketListener;
