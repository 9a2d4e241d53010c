//! Client handles.

use std::{fmt, sync::Arc};

use crate::{
    channel::{ClientChannel, Outbound},
    error::DeliveryError,
};

/// One live connection as a room member.
///
/// Cloning is cheap and every clone refers to the same connection. Identity
/// for unregister purposes is the `session_id`, not the `user_id`: two
/// connections may claim the same user id, but only the one currently in the
/// directory can remove itself.
#[derive(Clone)]
pub struct ClientHandle {
    session_id: u64,
    user_id: Arc<str>,
    room: Arc<str>,
    channel: Arc<dyn ClientChannel>,
}

impl ClientHandle {
    /// Create a handle for a connection.
    pub fn new(
        session_id: u64,
        user_id: impl Into<Arc<str>>,
        room: impl Into<Arc<str>>,
        channel: impl ClientChannel,
    ) -> Self {
        Self {
            session_id,
            user_id: user_id.into(),
            room: room.into(),
            channel: Arc::new(channel),
        }
    }

    /// Server-assigned session identifier.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Client-asserted user identifier.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Room this handle belongs to. Fixed for the handle's lifetime.
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Push a message to the connection without blocking.
    pub fn deliver(&self, outbound: Outbound) -> Result<(), DeliveryError> {
        self.channel.deliver(outbound)
    }

    /// Ask the connection to shut down.
    pub fn close(&self) {
        self.channel.close();
    }

    /// Whether the connection has been told to shut down.
    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    /// Whether `other` refers to the same connection.
    pub fn same_session(&self, other: &Self) -> bool {
        self.session_id == other.session_id && self.user_id == other.user_id
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("session_id", &format_args!("{:016x}", self.session_id))
            .field("user_id", &self.user_id)
            .field("room", &self.room)
            .finish_non_exhaustive()
    }
}
