use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::trace;

use crate::error::TransportError;
use crate::traits::{ReceiveListener, ReceiverSet, SendFuture, Transport};

/// One end of an in-process loopback pair.
///
/// Bytes sent on one end are delivered to the listeners of the other end,
/// optionally re-chunked to exercise framing.
#[derive(Debug)]
pub struct DuplexTransport {
    local: Arc<ReceiverSet>,
    remote: Arc<ReceiverSet>,
    closed: Arc<AtomicBool>,
    chunk_size: Option<usize>,
}

impl DuplexTransport {
    /// Create a connected pair.
    pub fn pair() -> (Self, Self) {
        Self::pair_with_chunk_size(None)
    }

    /// Create a connected pair that splits every send into chunks of at most
    /// `chunk_size` bytes. `None` delivers each send as one chunk.
    pub fn pair_with_chunk_size(chunk_size: Option<usize>) -> (Self, Self) {
        let left = Arc::new(ReceiverSet::new());
        let right = Arc::new(ReceiverSet::new());
        let closed = Arc::new(AtomicBool::new(false));
        let chunk_size = chunk_size.filter(|size| *size > 0);

        (
            Self {
                local: Arc::clone(&left),
                remote: Arc::clone(&right),
                closed: Arc::clone(&closed),
                chunk_size,
            },
            Self {
                local: right,
                remote: left,
                closed,
                chunk_size,
            },
        )
    }

    /// True once either end has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for DuplexTransport {
    fn send(&self, bytes: Bytes) -> SendFuture<'_> {
        Box::pin(async move {
            if self.is_closed() {
                return Err(TransportError::Shutdown);
            }
            trace!(len = bytes.len(), "duplex send");
            match self.chunk_size {
                Some(size) => {
                    let mut rest = bytes;
                    while !rest.is_empty() {
                        let take = size.min(rest.len());
                        self.remote.deliver(rest.split_to(take));
                    }
                }
                None => self.remote.deliver(bytes),
            }
            Ok(())
        })
    }

    fn on_receive(&self, listener: ReceiveListener) {
        self.local.register(listener);
    }

    fn close(&self) -> SendFuture<'_> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "duplex"
    }
}
