use bytes::{Buf, Bytes, BytesMut};
use tracing::{trace, warn};

use crate::codec::{decode_frame, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Reassembles frame payloads from arbitrarily split byte chunks.
///
/// Chunk boundaries may fall anywhere: inside the length prefix, inside the
/// payload, or exactly between frames. A chunk may also carry several frames.
///
/// A frame whose declared length exceeds the limit is reported as an error in
/// its place and its payload is skipped as it arrives, so the frames after it
/// stay aligned.
pub struct ReadFramer {
    buf: BytesMut,
    /// Payload bytes of a rejected frame still to be discarded.
    skip: usize,
    config: FrameConfig,
}

impl ReadFramer {
    /// Create a framer with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a framer with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            skip: 0,
            config,
        }
    }

    /// Feed a chunk and return every frame it completed, in stream order.
    ///
    /// Each entry is either a payload or the rejection of an oversized frame.
    /// An empty vector means the current frame is still incomplete.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Bytes>> {
        let chunk = self.discard(chunk);
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            if self.skip > 0 {
                let n = self.skip.min(self.buf.len());
                self.buf.advance(n);
                self.skip -= n;
                if self.skip > 0 {
                    break;
                }
            }
            match decode_frame(&mut self.buf, self.config.max_payload_size) {
                Ok(Some(payload)) => frames.push(Ok(payload)),
                Ok(None) => break,
                Err(FrameError::PayloadTooLarge { size, max }) => {
                    warn!(size, max, "skipping oversized frame");
                    self.buf.advance(HEADER_SIZE);
                    self.skip = size;
                    frames.push(Err(FrameError::PayloadTooLarge { size, max }));
                }
            }
        }

        trace!(
            completed = frames.len(),
            buffered = self.buf.len(),
            skipping = self.skip,
            "read framer consumed chunk"
        );
        frames
    }

    /// Drop the front of `chunk` that belongs to a rejected frame.
    fn discard<'a>(&mut self, chunk: &'a [u8]) -> &'a [u8] {
        if self.skip == 0 || !self.buf.is_empty() {
            return chunk;
        }
        let n = self.skip.min(chunk.len());
        self.skip -= n;
        &chunk[n..]
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Payload bytes of a rejected frame not yet received.
    pub fn skipping(&self) -> usize {
        self.skip
    }

    /// Drop any partially received frame.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.skip = 0;
    }

    /// Current framer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Default for ReadFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReadFramer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadFramer")
            .field("buffered", &self.buf.len())
            .field("skipping", &self.skip)
            .field("config", &self.config)
            .finish()
    }
}
