use bytes::{Bytes, BytesMut};

use crate::codec::{encode_frame, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Produces wire frames from payloads.
#[derive(Debug, Clone, Default)]
pub struct WriteFramer {
    config: FrameConfig,
}

impl WriteFramer {
    /// Create a framer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a framer with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self { config }
    }

    /// Prefix `payload` with its length. The payload is copied unchanged.
    pub fn frame(&self, payload: &[u8]) -> Result<Bytes> {
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        encode_frame(payload, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Current framer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ReadFramer;

    #[test]
    fn frame_layout() {
        let framed = WriteFramer::new().frame(b"abc").unwrap();
        assert_eq!(framed.as_ref(), &[3, 0, 0, 0, b'a', b'b', b'c']);
    }

    #[test]
    fn empty_payload_is_legal() {
        let framed = WriteFramer::new().frame(b"").unwrap();
        assert_eq!(framed.as_ref(), &[0, 0, 0, 0]);
    }

    #[test]
    fn rejects_payload_over_limit() {
        let framer = WriteFramer::with_config(FrameConfig {
            max_payload_size: 2,
        });
        let err = framer.frame(b"abc").unwrap_err();
        assert_eq!(err, FrameError::PayloadTooLarge { size: 3, max: 2 });
    }

    #[test]
    fn reader_accepts_writer_output() {
        let writer = WriteFramer::new();
        let mut reader = ReadFramer::new();
        let payload = vec![0xAB; 64 * 1024];

        let framed = writer.frame(&payload).unwrap();
        let mut frames = reader.push(&framed);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames.remove(0).unwrap().as_ref(), payload.as_slice());
    }
}
