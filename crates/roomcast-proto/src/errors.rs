//! Protocol error types.

use thiserror::Error;

use crate::Opcode;

/// Errors produced while encoding or decoding frames and payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer is shorter than a frame header
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum number of bytes required
        expected: usize,
        /// Number of bytes available
        actual: usize,
    },

    /// Header does not start with the Roomcast magic number
    #[error("invalid magic number")]
    InvalidMagic,

    /// Header carries a protocol version we do not speak
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Payload exceeds [`crate::FrameHeader::MAX_PAYLOAD_SIZE`]
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Claimed or actual payload size
        size: usize,
        /// Maximum permitted size
        max: usize,
    },

    /// Buffer ends before the payload the header announced
    #[error("frame truncated: expected {expected} payload bytes, got {actual}")]
    FrameTruncated {
        /// Payload size announced by the header
        expected: usize,
        /// Payload bytes actually present
        actual: usize,
    },

    /// Opcode value is not assigned
    #[error("unknown opcode: {0:#06x}")]
    UnknownOpcode(u16),

    /// Payload was decoded as the wrong kind
    #[error("unexpected opcode: expected {expected:?}, got {actual:?}")]
    UnexpectedOpcode {
        /// Opcode the caller asked for
        expected: Opcode,
        /// Opcode found in the header
        actual: Opcode,
    },

    /// CBOR serialization failed
    #[error("CBOR encode error: {0}")]
    CborEncode(String),

    /// CBOR deserialization failed
    #[error("CBOR decode error: {0}")]
    CborDecode(String),
}

impl ProtocolError {
    /// Returns true if the stream can no longer be read after this error.
    ///
    /// Header-level corruption leaves the reader without a trustworthy frame
    /// boundary. Payload-level errors only spoil one frame.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::FrameTooShort { .. }
                | Self::InvalidMagic
                | Self::UnsupportedVersion(_)
                | Self::PayloadTooLarge { .. }
                | Self::FrameTruncated { .. }
        )
    }
}

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
