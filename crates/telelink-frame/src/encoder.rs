use bytes::{Bytes, BytesMut};

use crate::codec::{encode_message_with, Message, MAX_FRAME_SIZE};
use crate::crc::{CrcSeeds, CRC_SEEDS};
use crate::error::Result;

/// Stamps outgoing messages with a sender identity and sequence number.
#[derive(Debug)]
pub struct FrameEncoder {
    system_id: u8,
    component_id: u8,
    seq: u8,
    seeds: &'static CrcSeeds,
    buf: BytesMut,
}

impl FrameEncoder {
    /// Create an encoder for the given sender identity.
    pub fn new(system_id: u8, component_id: u8) -> Self {
        Self::with_seeds(system_id, component_id, &CRC_SEEDS)
    }

    /// Create an encoder using an explicit seed table.
    pub fn with_seeds(system_id: u8, component_id: u8, seeds: &'static CrcSeeds) -> Self {
        Self {
            system_id,
            component_id,
            seq: 0,
            seeds,
            buf: BytesMut::with_capacity(MAX_FRAME_SIZE),
        }
    }

    /// Encode a payload as a message from this sender.
    ///
    /// The sequence number advances (wrapping) only when encoding succeeds.
    pub fn finalize(&mut self, msg_id: u8, payload: &[u8]) -> Result<Bytes> {
        let msg = Message {
            seq: self.seq,
            system_id: self.system_id,
            component_id: self.component_id,
            msg_id,
            payload: Bytes::copy_from_slice(payload),
        };
        let frame = self.encode(&msg)?;
        self.seq = self.seq.wrapping_add(1);
        Ok(frame)
    }

    /// Encode a message exactly as given (header fields untouched).
    pub fn encode(&mut self, msg: &Message) -> Result<Bytes> {
        self.buf.clear();
        encode_message_with(msg, self.seeds, &mut self.buf)?;
        Ok(self.buf.split().freeze())
    }

    /// Sequence number the next finalized message will carry.
    pub fn next_seq(&self) -> u8 {
        self.seq
    }

    pub fn system_id(&self) -> u8 {
        self.system_id
    }

    pub fn component_id(&self) -> u8 {
        self.component_id
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::codec::{decode_message, MAX_PAYLOAD};
    use crate::error::FrameError;

    #[test]
    fn finalize_stamps_identity_and_sequence() {
        let mut encoder = FrameEncoder::new(42, 240);

        let first = encoder.finalize(0, b"hb").unwrap();
        let second = encoder.finalize(0, b"hb").unwrap();

        let m1 = decode_message(&mut BytesMut::from(first.as_ref()))
            .unwrap()
            .unwrap();
        let m2 = decode_message(&mut BytesMut::from(second.as_ref()))
            .unwrap()
            .unwrap();

        assert_eq!((m1.system_id, m1.component_id), (42, 240));
        assert_eq!((m1.seq, m2.seq), (0, 1));
        assert_eq!(encoder.next_seq(), 2);
    }

    #[test]
    fn sequence_wraps() {
        let mut encoder = FrameEncoder::new(1, 1);
        for _ in 0..256 {
            encoder.finalize(0, b"").unwrap();
        }
        assert_eq!(encoder.next_seq(), 0);
    }

    #[test]
    fn oversized_payload_keeps_sequence() {
        let mut encoder = FrameEncoder::new(1, 1);
        let err = encoder.finalize(0, &[0u8; MAX_PAYLOAD + 1]).unwrap_err();

        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert_eq!(encoder.next_seq(), 0);
    }

    #[test]
    fn encode_forwards_foreign_header() {
        let mut encoder = FrameEncoder::new(1, 1);
        let foreign = Message {
            seq: 99,
            system_id: 7,
            component_id: 8,
            msg_id: 30,
            payload: Bytes::from_static(b"att"),
        };

        let frame = encoder.encode(&foreign).unwrap();
        let decoded = decode_message(&mut BytesMut::from(frame.as_ref()))
            .unwrap()
            .unwrap();

        assert_eq!(decoded, foreign);
        assert_eq!(encoder.next_seq(), 0);
    }

    #[test]
    fn consecutive_frames_are_independent() {
        let mut encoder = FrameEncoder::new(1, 1);
        let a = encoder.finalize(1, b"aaaa").unwrap();
        let b = encoder.finalize(2, b"bb").unwrap();

        assert_eq!(a.len(), 6 + 4 + 2);
        assert_eq!(b.len(), 6 + 2 + 2);
        assert_eq!(a[5], 1);
        assert_eq!(b[5], 2);
    }
}
