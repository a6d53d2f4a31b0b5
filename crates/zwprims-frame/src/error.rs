/// Why a byte sequence starting with SOF was rejected.
///
/// These are link-level conditions: the link NAKs the frame and keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidFrame {
    /// The trailing checksum does not match the frame contents.
    #[error("checksum mismatch (expected {expected:#04x}, got {actual:#04x})")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// The length byte is too small to hold type, function id and checksum.
    #[error("invalid frame length {0} (minimum 3)")]
    InvalidLength(u8),

    /// The type byte is neither request nor response.
    #[error("unknown frame type {0:#04x}")]
    UnknownFrameType(u8),
}

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A malformed frame was received.
    #[error("invalid frame: {0}")]
    Invalid(#[from] InvalidFrame),

    /// The payload does not fit the one-byte length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended, possibly in the middle of a frame.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
