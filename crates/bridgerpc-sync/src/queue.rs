use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::mpsc;

use crate::error::{Result, SyncError};

/// The one real sender, shared by every handle. Taking it closes the queue.
type SenderSlot<T> = Arc<Mutex<Option<mpsc::UnboundedSender<T>>>>;

fn lock<T>(slot: &SenderSlot<T>) -> MutexGuard<'_, Option<mpsc::UnboundedSender<T>>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

/// Create an unbounded multi-producer, single-consumer queue.
pub fn queue<T>() -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let slot = Arc::new(Mutex::new(Some(tx)));
    (
        QueueSender {
            slot: Arc::clone(&slot),
        },
        QueueReceiver { slot, rx },
    )
}

/// Producer handle. Clone it to add producers.
pub struct QueueSender<T> {
    slot: SenderSlot<T>,
}

impl<T> QueueSender<T> {
    /// Append a value. Fails with [`SyncError::Closed`] once the queue is closed.
    pub fn send(&self, value: T) -> Result<()> {
        match lock(&self.slot).as_ref() {
            Some(tx) => tx.send(value).map_err(|_| SyncError::Closed),
            None => Err(SyncError::Closed),
        }
    }

    /// Close the queue. Buffered values remain readable.
    pub fn close(&self) {
        lock(&self.slot).take();
    }

    /// True once the queue has been closed by any handle.
    pub fn is_closed(&self) -> bool {
        lock(&self.slot).as_ref().is_none_or(|tx| tx.is_closed())
    }
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> std::fmt::Debug for QueueSender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueSender")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Consumer handle.
///
/// Values come out in FIFO order. After close, `recv` keeps yielding the
/// buffered values and then `None`. The receiver is also a [`Stream`] that
/// ends at the same point, and polling it again after the end is allowed.
pub struct QueueReceiver<T> {
    slot: SenderSlot<T>,
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> QueueReceiver<T> {
    /// Wait for the next value; `None` means closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next value without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Poll for the next value.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }

    /// Close the queue from the consumer side.
    pub fn close(&mut self) {
        lock(&self.slot).take();
        self.rx.close();
    }

    /// True once the queue has been closed.
    pub fn is_closed(&self) -> bool {
        lock(&self.slot).is_none()
    }

    /// Number of values buffered and not yet consumed.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// True if no values are buffered.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Drain the queue until it is closed, collecting every value.
    pub async fn collect(&mut self) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(value) = self.recv().await {
            out.push(value);
        }
        out
    }
}

impl<T> Stream for QueueReceiver<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().poll_recv(cx)
    }
}

impl<T> std::fmt::Debug for QueueReceiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueReceiver")
            .field("buffered", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifo_then_end_after_close() {
        let (tx, mut rx) = queue();
        tx.send(1u32).unwrap();
        tx.send(2u32).unwrap();
        tx.close();

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, None);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (tx, mut rx) = queue::<u8>();
        rx.close();

        assert_eq!(tx.send(1), Err(SyncError::Closed));
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn multiple_producers_keep_order_per_send() {
        let (tx, mut rx) = queue();
        let tx2 = tx.clone();

        tx.send("a").unwrap();
        tx2.send("b").unwrap();
        tx.send("c").unwrap();
        drop(tx2);
        tx.close();

        assert_eq!(rx.collect().await, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn close_wakes_waiting_consumer() {
        let (tx, mut rx) = queue::<u8>();
        let consumer = tokio::spawn(async move { rx.recv().await });

        tokio::task::yield_now().await;
        tx.close();

        assert_eq!(consumer.await.unwrap(), None);
    }

    #[tokio::test]
    async fn consumer_waits_for_late_send() {
        let (tx, mut rx) = queue();
        let consumer = tokio::spawn(async move { rx.recv().await });

        tokio::task::yield_now().await;
        tx.send(99u16).unwrap();

        assert_eq!(consumer.await.unwrap(), Some(99));
    }

    #[tokio::test]
    async fn concurrent_producers_deliver_everything() {
        let (tx, mut rx) = queue();
        let mut producers = Vec::new();
        for p in 0..4u32 {
            let tx = tx.clone();
            producers.push(tokio::spawn(async move {
                for i in 0..25u32 {
                    tx.send(p * 100 + i).unwrap();
                }
            }));
        }
        for producer in producers {
            producer.await.unwrap();
        }
        tx.close();

        let mut values = rx.collect().await;
        values.sort_unstable();
        assert_eq!(values.len(), 100);
        assert_eq!(values[0], 0);
        assert_eq!(values[99], 324);
    }

    #[test]
    fn try_recv_and_len() {
        let (tx, mut rx) = queue();
        assert!(rx.is_empty());
        tx.send(3u8).unwrap();
        assert_eq!(rx.len(), 1);
        assert_eq!(rx.try_recv(), Some(3));
        assert_eq!(rx.try_recv(), None);
    }

    #[tokio::test]
    async fn abandoned_waits_do_not_block_delivery() {
        let (tx, mut rx) = queue();
        for _ in 0..64 {
            let result =
                tokio::time::timeout(std::time::Duration::from_millis(1), rx.recv()).await;
            assert!(result.is_err());
        }

        tx.send(5u8).unwrap();
        tx.close();
        assert_eq!(rx.collect().await, vec![5]);
    }

    #[tokio::test]
    async fn consumer_close_keeps_buffer_drainable() {
        let (tx, mut rx) = queue();
        tx.send(1u8).unwrap();
        rx.close();

        assert!(tx.is_closed());
        assert_eq!(tx.send(2), Err(SyncError::Closed));
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, None);
    }
}
