/// Errors raised by the coordination primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// A value was already deposited into a single-value channel.
    #[error("value already sent")]
    ValueAlreadySent,

    /// The channel or queue was closed.
    #[error("channel closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, SyncError>;
