//! Roomcast wire protocol.
//!
//! Every message on a Roomcast stream is a [`Frame`]: a fixed 16-byte binary
//! header followed by a variable-length payload. The header is enough to route
//! and size a frame; typed payloads ([`Payload`]) are CBOR-encoded, except for
//! chat messages which travel as raw bytes the relay never inspects.
//!
//! # Components
//!
//! - [`FrameHeader`]: zero-copy header (magic, version, opcode, sizes)
//! - [`Frame`]: header + payload bytes, with encode/decode
//! - [`Opcode`]: operation codes
//! - [`Payload`]: typed view over a frame's payload

mod errors;
mod frame;
mod header;
mod opcode;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use opcode::Opcode;
pub use payloads::Payload;

/// ALPN protocol identifier negotiated during the QUIC handshake.
pub const ALPN_PROTOCOL: &[u8] = b"roomcast";
