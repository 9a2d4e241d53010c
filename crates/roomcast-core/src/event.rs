//! Coordinator events.

use std::sync::Arc;

use bytes::Bytes;

use crate::handle::ClientHandle;

/// Sender identity attributed to relay-generated messages.
pub const SYSTEM_SENDER: &str = "system";

/// Text of the announcement sent to a room when someone joins.
pub fn welcome_message(user_id: &str, room: &str) -> String {
    format!("Welcome {user_id} to room {room}!")
}

/// Who a broadcast comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sender {
    /// A room member. They do not receive their own message.
    User(Arc<str>),
    /// The relay, speaking about `subject`. Delivered as [`SYSTEM_SENDER`]
    /// and not delivered to `subject`.
    System {
        /// User the announcement is about
        subject: Arc<str>,
    },
}

impl Sender {
    /// Identity recipients see.
    pub fn identity(&self) -> &str {
        match self {
            Self::User(user_id) => user_id,
            Self::System { .. } => SYSTEM_SENDER,
        }
    }

    /// Member that must not receive the broadcast.
    pub fn excluded(&self) -> &str {
        match self {
            Self::User(user_id) | Self::System { subject: user_id } => user_id,
        }
    }

    fn identity_arc(&self) -> Arc<str> {
        match self {
            Self::User(user_id) => Arc::clone(user_id),
            Self::System { .. } => Arc::from(SYSTEM_SENDER),
        }
    }
}

/// A message to fan out to one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcast {
    /// Target room
    pub room: Arc<str>,
    /// Attributed sender
    pub sender: Sender,
    /// Opaque payload
    pub payload: Bytes,
}

impl Broadcast {
    /// Broadcast from a room member.
    pub fn from_user(
        room: impl Into<Arc<str>>,
        user_id: impl Into<Arc<str>>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self { room: room.into(), sender: Sender::User(user_id.into()), payload: payload.into() }
    }

    /// Join announcement for `user_id`, seen by everyone in `room` but them.
    pub fn welcome(room: &str, user_id: &str) -> Self {
        Self {
            room: Arc::from(room),
            sender: Sender::System { subject: Arc::from(user_id) },
            payload: Bytes::from(welcome_message(user_id, room)),
        }
    }

    pub(crate) fn outbound(&self) -> crate::channel::Outbound {
        crate::channel::Outbound { sender: self.sender.identity_arc(), payload: self.payload.clone() }
    }
}

/// A unit of work for the coordinator.
#[derive(Debug, Clone)]
pub enum Event {
    /// Add a handle to its room
    Register(ClientHandle),
    /// Remove a handle from its room
    Unregister(ClientHandle),
    /// Fan a message out to a room
    Broadcast(Broadcast),
}

impl Event {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register(_) => "register",
            Self::Unregister(_) => "unregister",
            Self::Broadcast(_) => "broadcast",
        }
    }
}
