//! Fuzz target for Frame::decode and Payload::from_frame
//!
//! Feeds arbitrary bytes through the same path the relay uses for every
//! inbound frame, looking for:
//! - Parser crashes or panics
//! - Integer overflows in size calculations
//! - CBOR payloads that allocate or recurse without bound
//!
//! # Invariants
//!
//! - NEVER panic; invalid input returns an error
//! - A decoded frame re-encodes to exactly the bytes it consumed

#![no_main]

use libfuzzer_sys::fuzz_target;
use roomcast_proto::{Frame, FrameHeader, Payload};

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = Frame::decode(data) else {
        return;
    };

    let consumed = FrameHeader::SIZE + frame.payload.len();
    let encoded = frame.to_vec().expect("decoded frame must re-encode");
    assert_eq!(encoded.as_slice(), &data[..consumed]);

    let _ = Payload::from_frame(frame);
});
