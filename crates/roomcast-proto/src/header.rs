//! Fixed-size frame header with zero-copy parsing.
//!
//! The header is 16 bytes of raw big-endian binary so a reader can size and
//! route a frame before touching its payload.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    Opcode,
    errors::{ProtocolError, Result},
};

/// Fixed 16-byte frame header (big-endian network byte order).
///
/// Layout:
///
/// ```text
/// 0      4   5   6      8          12         16
/// ┌──────┬───┬───┬──────┬──────────┬──────────┐
/// │magic │ver│rsv│opcode│request_id│ payload  │
/// │ RCST │   │   │ u16  │   u32    │ size u32 │
/// └──────┴───┴───┴──────┴──────────┴──────────┘
/// ```
///
/// All fields are byte arrays, so every 16-byte pattern is a valid
/// `FrameHeader` value and untrusted input can be cast directly. Semantic
/// validation (magic, version, size limit) happens in [`FrameHeader::from_bytes`].
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    magic: [u8; 4],
    version: u8,
    reserved: u8,
    opcode: [u8; 2],
    request_id: [u8; 4],
    pub(crate) payload_size: [u8; 4],
}

impl FrameHeader {
    /// Size of the serialized header in bytes
    pub const SIZE: usize = 16;

    /// Magic number: "RCST" in ASCII
    pub const MAGIC: u32 = 0x5243_5354;

    /// Current protocol version
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size (2 MiB)
    pub const MAX_PAYLOAD_SIZE: u32 = 2 * 1024 * 1024;

    /// Create a header for `opcode` with an empty payload.
    #[must_use]
    pub fn new(opcode: Opcode) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION,
            reserved: 0,
            opcode: opcode.to_u16().to_be_bytes(),
            request_id: [0; 4],
            payload_size: [0; 4],
        }
    }

    /// Parse a header from the front of `bytes` without copying.
    ///
    /// Trailing bytes (the payload) are ignored.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if fewer than [`Self::SIZE`] bytes
    /// - `ProtocolError::InvalidMagic` if the magic number is wrong
    /// - `ProtocolError::UnsupportedVersion` for any version but
    ///   [`Self::VERSION`]
    /// - `ProtocolError::PayloadTooLarge` if the announced payload exceeds
    ///   [`Self::MAX_PAYLOAD_SIZE`]
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let (header, _) = Self::ref_from_prefix(bytes).map_err(|_| {
            ProtocolError::FrameTooShort { expected: Self::SIZE, actual: bytes.len() }
        })?;

        if u32::from_be_bytes(header.magic) != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        let payload_size = header.payload_size();
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize the header.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(self.as_bytes());
        arr
    }

    /// Protocol version byte.
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Operation code as raw u16.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        u16::from_be_bytes(self.opcode)
    }

    /// Operation code as enum. `None` if unassigned.
    #[must_use]
    pub fn opcode_enum(&self) -> Option<Opcode> {
        Opcode::from_u16(self.opcode())
    }

    /// Client-assigned nonce for request/response correlation.
    #[must_use]
    pub fn request_id(&self) -> u32 {
        u32::from_be_bytes(self.request_id)
    }

    /// Length of the payload following this header.
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }

    /// Set the request nonce.
    pub fn set_request_id(&mut self, request_id: u32) {
        self.request_id = request_id.to_be_bytes();
    }

    /// Set the announced payload length.
    ///
    /// [`crate::Frame::new`] keeps this in sync automatically; only use it to
    /// craft malformed frames in tests.
    pub fn set_payload_size(&mut self, size: u32) {
        self.payload_size = size.to_be_bytes();
    }
}

impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("version", &self.version)
            .field("opcode", &format_args!("{:#06x}", self.opcode()))
            .field("request_id", &self.request_id())
            .field("payload_size", &self.payload_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_sixteen_bytes() {
        assert_eq!(std::mem::size_of::<FrameHeader>(), FrameHeader::SIZE);
    }

    #[test]
    fn new_header_parses_back() {
        let mut header = FrameHeader::new(Opcode::Join);
        header.set_request_id(7);

        let bytes = header.to_bytes();
        let parsed = FrameHeader::from_bytes(&bytes).unwrap();

        assert_eq!(parsed.opcode_enum(), Some(Opcode::Join));
        assert_eq!(parsed.request_id(), 7);
        assert_eq!(parsed.payload_size(), 0);
        assert_eq!(parsed.version(), FrameHeader::VERSION);
    }

    #[test]
    fn rejects_short_buffer() {
        let result = FrameHeader::from_bytes(&[0u8; 10]);
        assert_eq!(result, Err(ProtocolError::FrameTooShort { expected: 16, actual: 10 }));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = FrameHeader::new(Opcode::Ping).to_bytes();
        bytes[0] = b'X';
        assert_eq!(FrameHeader::from_bytes(&bytes), Err(ProtocolError::InvalidMagic));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = FrameHeader::new(Opcode::Ping).to_bytes();
        bytes[4] = 9;
        assert_eq!(FrameHeader::from_bytes(&bytes), Err(ProtocolError::UnsupportedVersion(9)));
    }

    #[test]
    fn rejects_oversized_payload_claim() {
        let mut header = FrameHeader::new(Opcode::Message);
        header.set_payload_size(FrameHeader::MAX_PAYLOAD_SIZE + 1);

        let bytes = header.to_bytes();
        assert!(matches!(
            FrameHeader::from_bytes(&bytes),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn unknown_opcode_is_not_a_header_error() {
        let mut bytes = FrameHeader::new(Opcode::Ping).to_bytes();
        bytes[6..8].copy_from_slice(&0xBEEFu16.to_be_bytes());

        let parsed = FrameHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.opcode(), 0xBEEF);
        assert_eq!(parsed.opcode_enum(), None);
    }
}
