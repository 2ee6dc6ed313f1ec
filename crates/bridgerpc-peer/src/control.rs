//! Liveness probes and connection control.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use bridgerpc_sync::ValueChannel;

/// Outstanding `PING`s waiting for a `PONG`.
///
/// A `PONG` carries no correlation, so one arriving `PONG` satisfies every
/// probe pending at that moment.
#[derive(Debug, Default)]
pub struct ProbeSet {
    next: AtomicU64,
    pending: Mutex<HashMap<u64, ValueChannel<()>>>,
}

/// Handle for one registered probe.
#[derive(Debug)]
pub struct ProbeTicket {
    pub key: u64,
    pub reply: ValueChannel<()>,
}

impl ProbeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a probe before its `PING` is sent.
    pub fn register(&self) -> ProbeTicket {
        let key = self.next.fetch_add(1, Ordering::Relaxed);
        let reply = ValueChannel::new();
        self.lock().insert(key, reply.clone());
        ProbeTicket { key, reply }
    }

    /// Drop a probe that timed out or failed to send.
    pub fn forget(&self, key: u64) {
        self.lock().remove(&key);
    }

    /// Resolve every pending probe. Returns how many were resolved.
    pub fn resolve_all(&self) -> usize {
        let pending: Vec<_> = self.lock().drain().map(|(_, reply)| reply).collect();
        for reply in &pending {
            let _ = reply.send(());
        }
        pending.len()
    }

    /// Abandon every pending probe without resolving it.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, ValueChannel<()>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}
