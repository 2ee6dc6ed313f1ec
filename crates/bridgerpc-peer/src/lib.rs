//! The bridgerpc engine.
//!
//! [`BridgeRpc`] owns a transport and multiplexes many request/response
//! exchanges over it. Inbound requests are dispatched through a [`Router`];
//! outbound requests are correlated with their responses by [`Id`].
//!
//! Streaming is the general case ([`BridgeRpc::start_request`],
//! [`ResponseWriter`]); [`BridgeRpc::request`] and [`Router::add_unary`] are
//! the single-chunk shorthand.

pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod link;
pub mod request;
pub mod response;
pub mod router;
pub mod session;

pub use bridgerpc_protocol::{Headers, Id, IdGenerator, Value};
pub use config::RpcConfig;
pub use engine::BridgeRpc;
pub use error::{PeerError, Result, SessionError};
pub use request::{IncomingRequest, OutgoingRequest};
pub use response::{IncomingResponse, ResponseHead, ResponseWriter, UnaryResponse};
pub use router::{RequestContext, Router, Service, ServiceFuture, UnaryRequest};
pub use session::{Session, SessionContext, SessionManager, SessionRef};
