//! Operation codes carried in the frame header.

/// Frame operation code.
///
/// Values are grouped by range: `0x0_` handshake, `0x1_` chat traffic,
/// `0x2_` liveness, `0x3_` teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Client asks to join a room (C→S)
    Join = 0x01,
    /// Server accepted the join (S→C)
    JoinAck = 0x02,
    /// Opaque chat payload from a client (C→S)
    Message = 0x10,
    /// Payload relayed to a room member, with sender identity (S→C)
    Delivery = 0x11,
    /// Liveness probe
    Ping = 0x20,
    /// Liveness probe response
    Pong = 0x21,
    /// Graceful disconnect
    Goodbye = 0x30,
    /// Error report; the sender closes afterwards
    Error = 0x3F,
}

impl Opcode {
    /// Raw wire value.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse a raw wire value. `None` if unassigned.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x01 => Some(Self::Join),
            0x02 => Some(Self::JoinAck),
            0x10 => Some(Self::Message),
            0x11 => Some(Self::Delivery),
            0x20 => Some(Self::Ping),
            0x21 => Some(Self::Pong),
            0x30 => Some(Self::Goodbye),
            0x3F => Some(Self::Error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_opcode_maps_back_to_itself() {
        for opcode in [
            Opcode::Join,
            Opcode::JoinAck,
            Opcode::Message,
            Opcode::Delivery,
            Opcode::Ping,
            Opcode::Pong,
            Opcode::Goodbye,
            Opcode::Error,
        ] {
            assert_eq!(Opcode::from_u16(opcode.to_u16()), Some(opcode));
        }
    }

    #[test]
    fn unassigned_values_are_rejected() {
        assert_eq!(Opcode::from_u16(0x00), None);
        assert_eq!(Opcode::from_u16(0xFFFF), None);
    }
}
