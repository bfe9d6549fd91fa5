/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds what the length byte can describe.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The frame trailer does not match the computed checksum.
    #[error("crc mismatch on message {msg_id} (expected {expected:#06x}, got {actual:#06x})")]
    CrcMismatch {
        msg_id: u8,
        expected: u16,
        actual: u16,
    },
}

pub type Result<T> = std::result::Result<T, FrameError>;
