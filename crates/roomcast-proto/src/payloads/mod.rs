//! Typed frame payloads.
//!
//! Control payloads are CBOR-encoded; the opcode in the frame header says
//! which struct to expect, so no variant tag is serialized. Chat messages
//! ([`Payload::Message`]) are carried as raw bytes and never decoded by the
//! relay.

pub mod relay;
pub mod session;

use bytes::Bytes;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Frame, FrameHeader, Opcode,
    errors::{ProtocolError, Result},
};

/// All frame payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Join a room
    Join(session::Join),
    /// Join accepted
    JoinAck(session::JoinAck),
    /// Opaque chat message from a client
    Message(Bytes),
    /// Chat message relayed to a member
    Delivery(relay::Delivery),
    /// Liveness probe
    Ping,
    /// Liveness response
    Pong,
    /// Graceful disconnect
    Goodbye(session::Goodbye),
    /// Error report
    Error(ErrorPayload),
}

/// Error payload for error frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code identifying the type of error.
    pub code: u16,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorPayload {
    /// Join frame was missing or incomplete.
    pub const INVALID_JOIN: u16 = 0x0001;
    /// Frame could not be decoded.
    pub const INVALID_PAYLOAD: u16 = 0x0002;
    /// Server is at its connection limit.
    pub const SERVER_FULL: u16 = 0x0003;

    /// Create an invalid join error.
    pub fn invalid_join(reason: impl Into<String>) -> Self {
        Self { code: Self::INVALID_JOIN, message: reason.into() }
    }

    /// Create an invalid payload error.
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self { code: Self::INVALID_PAYLOAD, message: msg.into() }
    }

    /// Create a server full error.
    pub fn server_full() -> Self {
        Self { code: Self::SERVER_FULL, message: "connection limit reached".to_string() }
    }
}

impl Payload {
    /// Opcode corresponding to this payload type.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Join(_) => Opcode::Join,
            Self::JoinAck(_) => Opcode::JoinAck,
            Self::Message(_) => Opcode::Message,
            Self::Delivery(_) => Opcode::Delivery,
            Self::Ping => Opcode::Ping,
            Self::Pong => Opcode::Pong,
            Self::Goodbye(_) => Opcode::Goodbye,
            Self::Error(_) => Opcode::Error,
        }
    }

    /// Encode into a frame with a fresh header.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn into_frame(self) -> Result<Frame> {
        let header = FrameHeader::new(self.opcode());

        let payload = match self {
            Self::Join(join) => to_cbor(&join)?,
            Self::JoinAck(ack) => to_cbor(&ack)?,
            Self::Message(bytes) => bytes,
            Self::Delivery(delivery) => to_cbor(&delivery)?,
            Self::Ping | Self::Pong => Bytes::new(),
            Self::Goodbye(goodbye) => to_cbor(&goodbye)?,
            Self::Error(error) => to_cbor(&error)?,
        };

        Ok(Frame::new(header, payload))
    }

    /// Decode a frame's payload according to its opcode.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownOpcode` if the opcode is unassigned
    /// - `ProtocolError::CborDecode` if the payload does not match the opcode
    pub fn from_frame(frame: Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or_else(|| ProtocolError::UnknownOpcode(frame.header.opcode()))?;

        let payload = match opcode {
            Opcode::Join => Self::Join(from_cbor(&frame.payload)?),
            Opcode::JoinAck => Self::JoinAck(from_cbor(&frame.payload)?),
            Opcode::Message => Self::Message(frame.payload),
            Opcode::Delivery => Self::Delivery(from_cbor(&frame.payload)?),
            Opcode::Ping => Self::Ping,
            Opcode::Pong => Self::Pong,
            Opcode::Goodbye => Self::Goodbye(from_cbor(&frame.payload)?),
            Opcode::Error => Self::Error(from_cbor(&frame.payload)?),
        };

        Ok(payload)
    }
}

fn to_cbor<T: Serialize>(value: &T) -> Result<Bytes> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;
    Ok(Bytes::from(buf))
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_frame_carries_join_opcode() {
        let join = Payload::Join(session::Join {
            user_id: "alice".to_string(),
            room: "lobby".to_string(),
        });
        let frame = join.clone().into_frame().unwrap();

        assert_eq!(frame.header.opcode_enum(), Some(Opcode::Join));
        assert_eq!(Payload::from_frame(frame).unwrap(), join);
    }

    #[test]
    fn message_payload_is_not_cbor_wrapped() {
        let frame = Payload::Message(Bytes::from_static(b"hi")).into_frame().unwrap();
        assert_eq!(&frame.payload[..], b"hi");
    }

    #[test]
    fn ping_and_pong_have_empty_payloads() {
        assert!(Payload::Ping.into_frame().unwrap().payload.is_empty());
        assert!(Payload::Pong.into_frame().unwrap().payload.is_empty());
    }

    #[test]
    fn mismatched_payload_is_a_decode_error() {
        let frame = Frame::new(FrameHeader::new(Opcode::Delivery), &b"\xff\xff"[..]);
        assert!(matches!(Payload::from_frame(frame), Err(ProtocolError::CborDecode(_))));
    }

    #[test]
    fn unknown_opcode_is_reported() {
        let mut bytes = FrameHeader::new(Opcode::Ping).to_bytes();
        bytes[6..8].copy_from_slice(&0x0999u16.to_be_bytes());
        let frame = Frame::decode(&bytes).unwrap();

        assert_eq!(Payload::from_frame(frame), Err(ProtocolError::UnknownOpcode(0x0999)));
    }

    #[test]
    fn error_payload_constructors() {
        assert_eq!(ErrorPayload::invalid_join("x").code, ErrorPayload::INVALID_JOIN);
        assert_eq!(ErrorPayload::server_full().code, ErrorPayload::SERVER_FULL);
    }
}
