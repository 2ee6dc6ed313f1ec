use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::traits::{ReceiveListener, ReceiverSet, SendFuture, Transport};

const READ_CHUNK_SIZE: usize = 8 * 1024;

type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Transport over any tokio byte stream.
///
/// A background task reads the stream and hands each chunk to the receive
/// listeners. Writes are serialized so one `send` is never interleaved with
/// another.
pub struct StreamTransport {
    writer: Mutex<BoxWriter>,
    receivers: Arc<ReceiverSet>,
    cancel: CancellationToken,
    closed: AtomicBool,
    name: &'static str,
}

impl StreamTransport {
    /// Wrap a stream and start its reader task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        Self::named(stream, "stream")
    }

    pub(crate) fn named<S>(stream: S, name: &'static str) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let receivers = Arc::new(ReceiverSet::new());
        let cancel = CancellationToken::new();

        tokio::spawn(read_loop(reader, Arc::clone(&receivers), cancel.clone()));

        Self {
            writer: Mutex::new(Box::new(writer)),
            receivers,
            cancel,
            closed: AtomicBool::new(false),
            name,
        }
    }

    /// A token cancelled when the stream reaches EOF, fails, or is closed.
    pub fn closed_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

async fn read_loop<R>(mut reader: R, receivers: Arc<ReceiverSet>, cancel: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
    loop {
        buf.reserve(READ_CHUNK_SIZE);
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            read = reader.read_buf(&mut buf) => read,
        };
        match read {
            Ok(0) => {
                debug!("stream reached EOF");
                break;
            }
            Ok(_) => receivers.deliver(buf.split().freeze()),
            Err(err) => {
                warn!(error = %err, "stream read failed");
                break;
            }
        }
    }
    cancel.cancel();
}

impl Transport for StreamTransport {
    fn send(&self, bytes: Bytes) -> SendFuture<'_> {
        Box::pin(async move {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Shutdown);
            }
            let mut writer = self.writer.lock().await;
            writer.write_all(&bytes).await?;
            writer.flush().await?;
            Ok(())
        })
    }

    fn on_receive(&self, listener: ReceiveListener) {
        self.receivers.register(listener);
    }

    fn close(&self) -> SendFuture<'_> {
        Box::pin(async move {
            if self.closed.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            self.cancel.cancel();
            let mut writer = self.writer.lock().await;
            writer.shutdown().await?;
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("name", &self.name)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
