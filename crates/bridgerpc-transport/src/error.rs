use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot listen on {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot reach {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("accept: {0}")]
    Accept(std::io::Error),

    /// Read or write failure on an established stream.
    #[error("stream I/O: {0}")]
    Io(#[from] std::io::Error),

    /// `sun_path` cannot hold the requested path.
    #[error("{path} is {len} bytes, unix socket paths are limited to {max}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// `close()` was called; no more chunks go out.
    #[error("transport closed")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
