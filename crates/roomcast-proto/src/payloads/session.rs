//! Session payloads: joining a room and leaving it.

use serde::{Deserialize, Serialize};

/// First frame a client sends: which room to join and under what name.
///
/// Both fields must be non-empty. The server rejects the connection with an
/// error frame otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    /// Caller-chosen display identity. Unique only within a room.
    pub user_id: String,
    /// Name of the room to join. Created on first join.
    pub room: String,
}

impl Join {
    /// Longest accepted user id, in bytes. Bounds the sender field of every
    /// delivery.
    pub const MAX_USER_ID_LEN: usize = 256;

    /// True if the user id fits [`Self::MAX_USER_ID_LEN`].
    #[must_use]
    pub fn user_id_fits(&self) -> bool {
        self.user_id.len() <= Self::MAX_USER_ID_LEN
    }

    /// True if both the user id and the room name are non-empty.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.user_id.is_empty() && !self.room.is_empty()
    }
}

/// Server's answer to [`Join`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinAck {
    /// Server-assigned connection identifier
    pub session_id: u64,
}

/// Graceful disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goodbye {
    /// Free-form reason, for logs only
    pub reason: String,
}
