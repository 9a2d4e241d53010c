//! Property-based tests for frame encoding and decoding.
//!
//! Decoding sits directly behind the network, so it must reject every
//! malformed input with an error instead of panicking, and it must never read
//! past the payload the header announces.

use bytes::Bytes;
use proptest::prelude::*;
use roomcast_proto::{
    Frame, FrameHeader, Opcode, Payload, ProtocolError,
    payloads::{relay::Delivery, session::Join},
};

/// Strategy for generating arbitrary opcodes
fn arbitrary_opcode() -> impl Strategy<Value = Opcode> {
    prop_oneof![
        Just(Opcode::Join),
        Just(Opcode::JoinAck),
        Just(Opcode::Message),
        Just(Opcode::Delivery),
        Just(Opcode::Ping),
        Just(Opcode::Pong),
        Just(Opcode::Goodbye),
        Just(Opcode::Error),
    ]
}

/// Strategy for generating frames with arbitrary payload bytes
fn arbitrary_frame() -> impl Strategy<Value = Frame> {
    (arbitrary_opcode(), any::<u32>(), prop::collection::vec(any::<u8>(), 0..1024)).prop_map(
        |(opcode, request_id, payload)| {
            let mut header = FrameHeader::new(opcode);
            header.set_request_id(request_id);
            Frame::new(header, Bytes::from(payload))
        },
    )
}

proptest! {
    #[test]
    fn prop_encoded_frame_decodes_identically(frame in arbitrary_frame()) {
        let wire = frame.to_vec().expect("frame under size cap encodes");
        prop_assert_eq!(wire.len(), frame.encoded_len());

        let decoded = Frame::decode(&wire).expect("encoded frame decodes");
        prop_assert_eq!(decoded, frame);
    }

    #[test]
    fn prop_every_strict_prefix_is_rejected(frame in arbitrary_frame(), cut in any::<prop::sample::Index>()) {
        let wire = frame.to_vec().expect("frame under size cap encodes");
        let cut = cut.index(wire.len());

        let result = Frame::decode(&wire[..cut]);
        prop_assert!(result.is_err());
        prop_assert!(result.unwrap_err().is_fatal());
    }

    #[test]
    fn prop_arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = Frame::decode(&bytes).map(Payload::from_frame);
    }

    #[test]
    fn prop_message_payload_is_forwarded_verbatim(content in prop::collection::vec(any::<u8>(), 0..2048)) {
        let frame = Payload::Message(Bytes::from(content.clone())).into_frame().expect("encodes");
        let wire = frame.to_vec().expect("encodes");

        let decoded = Payload::from_frame(Frame::decode(&wire).expect("decodes")).expect("decodes");
        prop_assert_eq!(decoded, Payload::Message(Bytes::from(content)));
    }

    #[test]
    fn prop_delivery_survives_the_wire(sender in "[a-z]{1,16}", content in prop::collection::vec(any::<u8>(), 0..256)) {
        let delivery = Payload::Delivery(Delivery { sender, content });
        let wire = delivery.clone().into_frame().expect("encodes").to_vec().expect("encodes");

        let decoded = Payload::from_frame(Frame::decode(&wire).expect("decodes")).expect("decodes");
        prop_assert_eq!(decoded, delivery);
    }
}

#[test]
fn join_with_unicode_names_survives_the_wire() {
    let join = Payload::Join(Join { user_id: "Zoë".to_string(), room: "café ☕".to_string() });
    let wire = join.clone().into_frame().unwrap().to_vec().unwrap();

    let decoded = Payload::from_frame(Frame::decode(&wire).unwrap()).unwrap();
    assert_eq!(decoded, join);
}

#[test]
fn header_claiming_more_than_the_cap_is_rejected_before_reading_payload() {
    let mut header = FrameHeader::new(Opcode::Message);
    header.set_payload_size(u32::MAX);

    let result = Frame::decode(&header.to_bytes());
    assert!(matches!(result, Err(ProtocolError::PayloadTooLarge { .. })));
}
