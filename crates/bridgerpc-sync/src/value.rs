use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{Result, SyncError};

/// A single-value channel.
///
/// One side deposits exactly one value, or closes the channel before any value
/// was sent. Every clone shares the same slot, and every waiter, whether it
/// started waiting before or after the outcome was decided, observes the same
/// outcome.
pub struct ValueChannel<T> {
    slot: Arc<watch::Sender<Slot<T>>>,
}

enum Slot<T> {
    Empty,
    Value(T),
    Closed,
}

impl<T> ValueChannel<T> {
    /// Create an empty channel.
    pub fn new() -> Self {
        let (slot, _) = watch::channel(Slot::Empty);
        Self {
            slot: Arc::new(slot),
        }
    }

    /// Deposit the value and release every waiter.
    ///
    /// Fails with [`SyncError::ValueAlreadySent`] on a second send and with
    /// [`SyncError::Closed`] after the channel was closed.
    pub fn send(&self, value: T) -> Result<()> {
        let mut outcome = Ok(());
        self.slot.send_if_modified(|slot| match slot {
            Slot::Empty => {
                *slot = Slot::Value(value);
                true
            }
            Slot::Value(_) => {
                outcome = Err(SyncError::ValueAlreadySent);
                false
            }
            Slot::Closed => {
                outcome = Err(SyncError::Closed);
                false
            }
        });
        outcome
    }

    /// Close the channel.
    ///
    /// Pending waiters are released with [`SyncError::Closed`]. Closing after a
    /// value was sent leaves the value visible to every holder.
    pub fn close(&self) {
        self.slot.send_if_modified(|slot| match slot {
            Slot::Empty => {
                *slot = Slot::Closed;
                true
            }
            Slot::Value(_) | Slot::Closed => false,
        });
    }

    /// True once a value has been deposited.
    pub fn has_value(&self) -> bool {
        matches!(*self.slot.borrow(), Slot::Value(_))
    }

    /// True if the channel was closed without a value.
    pub fn is_closed(&self) -> bool {
        matches!(*self.slot.borrow(), Slot::Closed)
    }
}

impl<T: Clone> ValueChannel<T> {
    /// Wait for the outcome.
    ///
    /// Dropping the returned future before it completes leaves nothing behind.
    pub async fn recv(&self) -> Result<T> {
        let mut rx = self.slot.subscribe();
        // The sender lives as long as `self`, so the wait only ends on an outcome.
        let slot = rx
            .wait_for(|slot| !matches!(slot, Slot::Empty))
            .await
            .map_err(|_| SyncError::Closed)?;
        match &*slot {
            Slot::Value(value) => Ok(value.clone()),
            Slot::Empty | Slot::Closed => Err(SyncError::Closed),
        }
    }

    /// Return the value if one was already deposited.
    pub fn try_recv(&self) -> Option<T> {
        match &*self.slot.borrow() {
            Slot::Value(value) => Some(value.clone()),
            Slot::Empty | Slot::Closed => None,
        }
    }
}

impl<T> Clone for ValueChannel<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for ValueChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ValueChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.slot.borrow() {
            Slot::Empty => "empty",
            Slot::Value(_) => "value",
            Slot::Closed => "closed",
        };
        f.debug_struct("ValueChannel").field("state", &state).finish()
    }
}
