use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::crc::{CrcSeeds, X25, CRC_SEEDS};
use crate::error::{FrameError, Result};

/// Start-of-frame marker.
pub const STX: u8 = 0xFE;

/// Frame header: stx (1) + len (1) + seq (1) + sysid (1) + compid (1) + msgid (1).
pub const HEADER_SIZE: usize = 6;

/// CRC trailer size.
pub const CHECKSUM_SIZE: usize = 2;

/// Largest payload the length byte can describe.
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// Largest possible frame on the wire.
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD + CHECKSUM_SIZE;

/// A decoded message, or one ready to be encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Per-sender wrapping sequence number.
    pub seq: u8,
    /// Originating system (peer) id.
    pub system_id: u8,
    /// Originating component id.
    pub component_id: u8,
    /// Message type identifier; selects the CRC seed.
    pub msg_id: u8,
    /// Raw payload bytes.
    pub payload: Bytes,
}

impl Message {
    /// Create a message with zeroed header fields.
    pub fn new(msg_id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            seq: 0,
            system_id: 0,
            component_id: 0,
            msg_id,
            payload: payload.into(),
        }
    }

    /// Set the originating identity.
    pub fn with_origin(mut self, system_id: u8, component_id: u8) -> Self {
        self.system_id = system_id;
        self.component_id = component_id;
        self
    }

    /// The total wire size of this message (header + payload + trailer).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len() + CHECKSUM_SIZE
    }
}

/// Encode a message using the common seed table.
///
/// Wire format:
/// ```text
/// ┌──────┬─────┬─────┬───────┬────────┬───────┬──────────────┬──────────┐
/// │ 0xFE │ len │ seq │ sysid │ compid │ msgid │ payload[len] │ crc (LE) │
/// └──────┴─────┴─────┴───────┴────────┴───────┴──────────────┴──────────┘
/// ```
pub fn encode_message(msg: &Message, dst: &mut BytesMut) -> Result<()> {
    encode_message_with(msg, &CRC_SEEDS, dst)
}

/// Encode a message using an explicit seed table.
pub fn encode_message_with(msg: &Message, seeds: &CrcSeeds, dst: &mut BytesMut) -> Result<()> {
    if msg.payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: msg.payload.len(),
            max: MAX_PAYLOAD,
        });
    }

    dst.reserve(msg.wire_size());
    let start = dst.len();
    dst.put_u8(STX);
    dst.put_u8(msg.payload.len() as u8);
    dst.put_u8(msg.seq);
    dst.put_u8(msg.system_id);
    dst.put_u8(msg.component_id);
    dst.put_u8(msg.msg_id);
    dst.put_slice(&msg.payload);

    let mut crc = X25::new();
    crc.update(&dst[start + 1..]);
    crc.accumulate(seeds.seed(msg.msg_id));
    dst.put_u16_le(crc.finish());
    Ok(())
}

/// Decode a message using the common seed table.
pub fn decode_message(src: &mut BytesMut) -> Result<Option<Message>> {
    decode_message_with(src, &CRC_SEEDS)
}

/// Decode a message from a buffer.
///
/// Bytes ahead of the next start marker are discarded. Returns `Ok(None)` if
/// the buffer doesn't contain a complete frame yet. On a checksum failure only
/// the start marker is consumed, so the next call resynchronizes on whatever
/// follows it. On success, consumes the frame bytes from the buffer.
pub fn decode_message_with(src: &mut BytesMut, seeds: &CrcSeeds) -> Result<Option<Message>> {
    match src.iter().position(|&b| b == STX) {
        Some(0) => {}
        Some(skip) => {
            trace!(skip, "discarding bytes ahead of start marker");
            src.advance(skip);
        }
        None => {
            src.clear();
            return Ok(None);
        }
    }

    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let payload_len = src[1] as usize;
    let total = HEADER_SIZE + payload_len + CHECKSUM_SIZE;
    if src.len() < total {
        return Ok(None);
    }

    let msg_id = src[5];
    let mut crc = X25::new();
    crc.update(&src[1..HEADER_SIZE + payload_len]);
    crc.accumulate(seeds.seed(msg_id));
    let expected = crc.finish();
    let actual = u16::from_le_bytes([src[total - 2], src[total - 1]]);
    if expected != actual {
        src.advance(1);
        return Err(FrameError::CrcMismatch {
            msg_id,
            expected,
            actual,
        });
    }

    let seq = src[2];
    let system_id = src[3];
    let component_id = src[4];
    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();
    src.advance(CHECKSUM_SIZE);

    Ok(Some(Message {
        seq,
        system_id,
        component_id,
        msg_id,
        payload,
    }))
}
