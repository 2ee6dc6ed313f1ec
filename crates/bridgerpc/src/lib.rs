//! Bidirectional streaming RPC over any byte-stream transport.
//!
//! Either side of a connection can serve requests and send its own. Requests
//! and responses stream in chunks, carry structured headers and trailers, and
//! are multiplexed over one connection by exchange [`Id`].
//!
//! # Crate Structure
//!
//! - [`sync`]: single-value channels and unbounded queues
//! - [`transport`]: the byte-stream contract, loopback pairs, stream and Unix socket transports
//! - [`frame`]: length-prefixed framing
//! - [`protocol`]: frames, ids, codes, the msgpack wire codec and the per-exchange state machines
//! - [`peer`]: sessions, the [`BridgeRpc`] engine and the [`Router`]
//!
//! ```no_run
//! use bridgerpc::{BridgeRpc, Router, UnaryRequest};
//! use bridgerpc::transport::DuplexTransport;
//!
//! # async fn demo() -> bridgerpc::peer::Result<()> {
//! let mut router = Router::new();
//! router.add_unary("/echo", |req: UnaryRequest| async move { Ok(req.body) });
//!
//! let (a, b) = DuplexTransport::pair();
//! let _server = BridgeRpc::new(a, router);
//! let client = BridgeRpc::new(b, Router::new());
//!
//! let response = client.request("/echo", "hello").await?;
//! assert_eq!(response.body, "hello");
//! # Ok(())
//! # }
//! ```

/// Re-export concurrency primitives.
pub mod sync {
    pub use bridgerpc_sync::*;
}

/// Re-export transport types.
pub mod transport {
    pub use bridgerpc_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use bridgerpc_frame::*;
}

/// Re-export protocol types.
pub mod protocol {
    pub use bridgerpc_protocol::*;
}

/// Re-export engine types.
pub mod peer {
    pub use bridgerpc_peer::*;
}

pub use bridgerpc_peer::{
    BridgeRpc, Headers, Id, IncomingRequest, IncomingResponse, OutgoingRequest, PeerError,
    RequestContext, ResponseWriter, Router, RpcConfig, Service, UnaryRequest, UnaryResponse,
    Value,
};
pub use bridgerpc_protocol::{RequestErrorCode, ResponseErrorCode, ResponseStatusCode};
