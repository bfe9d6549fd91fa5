use bytes::BytesMut;

use crate::codec::{decode_message_with, Message, MAX_FRAME_SIZE};
use crate::crc::{CrcSeeds, CRC_SEEDS};
use crate::error::Result;

const INITIAL_BUFFER_CAPACITY: usize = 4 * MAX_FRAME_SIZE;

/// Streaming decoder: accepts byte chunks of any size, yields complete messages.
///
/// Handles partial frames internally — callers push whatever the transport
/// produced and drain whatever is complete. One decoder per byte stream; the
/// buffered partial frame is per-stream state.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    seeds: &'static CrcSeeds,
}

impl FrameDecoder {
    /// Create a decoder using the common seed table.
    pub fn new() -> Self {
        Self::with_seeds(&CRC_SEEDS)
    }

    /// Create a decoder using an explicit seed table.
    pub fn with_seeds(seeds: &'static CrcSeeds) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            seeds,
        }
    }

    /// Append received bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Direct access to the receive buffer, for reading straight into it.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Decode the next complete message, if one is buffered.
    pub fn next_message(&mut self) -> Result<Option<Message>> {
        decode_message_with(&mut self.buf, self.seeds)
    }

    /// Iterate over every complete message currently buffered.
    ///
    /// Checksum errors are yielded in place and iteration continues after them.
    pub fn drain(&mut self) -> Drain<'_> {
        Drain { decoder: self }
    }

    /// Number of bytes buffered but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Discard any buffered partial frame.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator returned by [`FrameDecoder::drain`].
pub struct Drain<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Drain<'_> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.next_message().transpose()
    }
}
