//! Length-prefixed message framing.
//!
//! Every frame on the wire is a 4-byte little-endian payload length followed
//! by the payload. Transports deliver arbitrary chunks; [`ReadFramer`] turns
//! them back into whole payloads.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{decode_frame, encode_frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use reader::ReadFramer;
pub use writer::WriteFramer;
