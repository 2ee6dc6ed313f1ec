//! Outbound half of a connection: frame encoding plus length-prefixing.

use std::sync::Arc;

use bridgerpc_frame::{FrameConfig, WriteFramer};
use bridgerpc_protocol::{wire, Frame};
use bridgerpc_transport::Transport;
use tracing::trace;

use crate::error::Result;

/// Encodes frames and writes them to a transport.
///
/// Shared by the engine and every request or response writer of one
/// connection.
pub struct Link {
    transport: Arc<dyn Transport>,
    framer: WriteFramer,
}

impl Link {
    pub fn new(transport: Arc<dyn Transport>, config: FrameConfig) -> Self {
        Self {
            transport,
            framer: WriteFramer::with_config(config),
        }
    }

    /// Encode, frame and send one protocol frame.
    pub async fn send(&self, frame: &Frame) -> Result<()> {
        let payload = wire::encode_frame(frame)?;
        let bytes = self.framer.frame(&payload)?;
        trace!(
            frame_type = ?frame.frame_type(),
            id = ?frame.id(),
            len = bytes.len(),
            "sending frame"
        );
        self.transport.send(bytes).await?;
        Ok(())
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("transport", &self.transport.name())
            .field("framer", &self.framer)
            .finish()
    }
}
