use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

use crate::error::Result;

/// Future returned by [`Transport::send`] and [`Transport::close`].
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Callback invoked for every byte chunk delivered by a transport.
pub type ReceiveListener = Arc<dyn Fn(Bytes) + Send + Sync>;

/// A bidirectional, ordered byte stream.
///
/// `send` delivers bytes in call order. Receive listeners see every chunk in
/// arrival order; chunk boundaries carry no meaning.
pub trait Transport: Send + Sync {
    /// Send a chunk of bytes to the remote end.
    fn send(&self, bytes: Bytes) -> SendFuture<'_>;

    /// Register a listener for inbound chunks.
    fn on_receive(&self, listener: ReceiveListener);

    /// Shut the transport down. Later sends fail with `TransportError::Shutdown`.
    fn close(&self) -> SendFuture<'_>;

    /// Transport name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Listener registry shared by transport implementations.
///
/// Chunks delivered before the first listener registers are held back and
/// replayed to it, so a transport may start reading before its owner is ready.
#[derive(Default)]
pub struct ReceiverSet {
    inner: Mutex<ReceiverSetInner>,
}

#[derive(Default)]
struct ReceiverSetInner {
    listeners: Vec<ReceiveListener>,
    backlog: Vec<Bytes>,
}

impl ReceiverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener, replaying any backlog to it.
    pub fn register(&self, listener: ReceiveListener) {
        let backlog = {
            let mut inner = self.lock();
            inner.listeners.push(Arc::clone(&listener));
            std::mem::take(&mut inner.backlog)
        };
        for chunk in backlog {
            listener(chunk);
        }
    }

    /// Hand a chunk to every listener.
    pub fn deliver(&self, chunk: Bytes) {
        let listeners = {
            let mut inner = self.lock();
            if inner.listeners.is_empty() {
                inner.backlog.push(chunk);
                return;
            }
            inner.listeners.clone()
        };
        for listener in &listeners {
            listener(chunk.clone());
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, ReceiverSetInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for ReceiverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("ReceiverSet")
            .field("listeners", &inner.listeners.len())
            .field("backlog", &inner.backlog.len())
            .finish()
    }
}
