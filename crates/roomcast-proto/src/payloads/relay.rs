//! Relayed chat traffic.

use serde::{Deserialize, Serialize};

use super::session::Join;
use crate::FrameHeader;

/// A room message delivered to one member.
///
/// `content` is the sender's payload, byte for byte. `sender` is the user id
/// of the member that sent it, or `"system"` for server announcements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// User id of the originating member
    pub sender: String,
    /// Opaque message bytes
    #[serde(with = "serde_bytes")]
    pub content: Vec<u8>,
}

impl Delivery {
    /// Worst-case CBOR bytes around `content`: the two-entry map, both keys,
    /// a maximal sender string, and a 32-bit byte-string length.
    pub const ENVELOPE_SIZE: usize = 1 + (1 + 6) + (3 + Join::MAX_USER_ID_LEN) + (1 + 7) + 5;

    /// Largest message the relay accepts. Any such message, from any valid
    /// sender, still fits in one Delivery frame.
    pub const MAX_CONTENT_SIZE: usize = FrameHeader::MAX_PAYLOAD_SIZE as usize - Self::ENVELOPE_SIZE;
}
