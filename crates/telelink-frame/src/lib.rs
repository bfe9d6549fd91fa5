//! Telemetry link framing.
//!
//! Every message on the wire is framed as:
//! - A start-of-frame marker (`0xFE`) for stream synchronization
//! - A 5-byte header: payload length, sequence, system id, component id, message id
//! - The payload (at most 255 bytes)
//! - A 2-byte CRC-16/X.25 trailer seeded per message type
//!
//! The transport layer treats this crate as a black box: feed it bytes, get
//! back complete messages or a checksum error.

pub mod codec;
pub mod crc;
pub mod decoder;
pub mod encoder;
pub mod error;

pub use codec::{
    decode_message, decode_message_with, encode_message, encode_message_with, Message,
    CHECKSUM_SIZE, HEADER_SIZE, MAX_FRAME_SIZE, MAX_PAYLOAD, STX,
};
pub use crc::{CrcSeeds, X25, CRC_SEEDS};
pub use decoder::FrameDecoder;
pub use encoder::FrameEncoder;
pub use error::{FrameError, Result};
