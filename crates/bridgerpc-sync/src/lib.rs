//! Coordination primitives for the bridgerpc protocol stack.
//!
//! - [`ValueChannel`] carries exactly one value (or a close) to any number of waiters.
//! - [`queue`] is a multi-producer, single-consumer FIFO that stays drainable after close.
//!
//! Both sit on `tokio::sync`: the value channel on `watch`, the queue on an
//! unbounded `mpsc` channel.

pub mod error;
pub mod queue;
pub mod value;

pub use error::{Result, SyncError};
pub use queue::{queue, QueueReceiver, QueueSender};
pub use value::ValueChannel;
