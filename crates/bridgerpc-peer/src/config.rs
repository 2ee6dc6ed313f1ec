use std::sync::Arc;
use std::time::Duration;

use bridgerpc_frame::FrameConfig;
use bridgerpc_protocol::IdGenerator;

/// Default bound on a unary [`request`](crate::BridgeRpc::request).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default wait for a `PONG` in [`probe`](crate::BridgeRpc::probe).
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Bound on unary requests. `None` waits forever.
    pub request_timeout: Option<Duration>,
    pub probe_timeout: Duration,
    pub frame: FrameConfig,
    /// Source of exchange ids. Share one generator between engines of the
    /// same process to keep their ids disjoint.
    pub id_generator: Arc<IdGenerator>,
}

impl RpcConfig {
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Limit frame payloads in both directions.
    ///
    /// The limit also bounds frames this side sends, including the error
    /// replies the engine produces on its own; a reply that does not fit is
    /// logged and dropped.
    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.frame = FrameConfig { max_payload_size };
        self
    }

    pub fn with_id_generator(mut self, generator: Arc<IdGenerator>) -> Self {
        self.id_generator = generator;
        self
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            frame: FrameConfig::default(),
            id_generator: Arc::new(IdGenerator::new()),
        }
    }
}
