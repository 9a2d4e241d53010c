//! Fuzz target for coordinator membership
//!
//! Drives a coordinator with arbitrary joins, leaves, broadcasts and abrupt
//! disconnects across a handful of users and rooms.
//!
//! # Invariants
//!
//! - A room exists iff it has at least one member
//! - A member never receives a message it sent
//! - A handle replaced by a later join under the same user id can never
//!   remove its replacement
//! - Member count never exceeds the number of live registrations

#![no_main]

use std::time::Instant;

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use roomcast_core::{
    Broadcast, ClientHandle, Coordinator, Environment, Event, OutboundQueue, queued_channel,
};

#[derive(Clone)]
struct FuzzEnv;

impl Environment for FuzzEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(0);
    }
}

#[derive(Debug, Clone, Arbitrary)]
enum Action {
    Join { user: u8, room: u8, capacity: u8 },
    Leave { connection: u8 },
    Send { connection: u8, payload: Vec<u8> },
    Disconnect { connection: u8 },
    Drain { connection: u8 },
}

struct Connection {
    handle: ClientHandle,
    queue: Option<OutboundQueue>,
}

fuzz_target!(|actions: Vec<Action>| {
    let mut coordinator = Coordinator::new(FuzzEnv);
    let mut connections: Vec<Connection> = Vec::new();

    for action in actions {
        match action {
            Action::Join { user, room, capacity } => {
                let (channel, queue) = queued_channel(usize::from(capacity % 8));
                let handle = ClientHandle::new(
                    connections.len() as u64,
                    format!("user-{}", user % 6),
                    format!("room-{}", room % 3),
                    channel,
                );
                coordinator.apply(Event::Register(handle.clone()));
                connections.push(Connection { handle, queue: Some(queue) });
            },
            Action::Leave { connection } if !connections.is_empty() => {
                let handle = connections[usize::from(connection) % connections.len()].handle.clone();
                coordinator.apply(Event::Unregister(handle));
            },
            Action::Send { connection, payload } if !connections.is_empty() => {
                let index = usize::from(connection) % connections.len();
                let handle = &connections[index].handle;
                let sender = handle.user_id().to_owned();
                coordinator.apply(Event::Broadcast(Broadcast::from_user(
                    handle.room(),
                    handle.user_id(),
                    Bytes::from(payload),
                )));
                if let Some(queue) = connections[index].queue.as_mut() {
                    while let Some(outbound) = queue.try_next() {
                        assert_ne!(&*outbound.sender, sender.as_str(), "member received its own message");
                    }
                }
            },
            Action::Disconnect { connection } if !connections.is_empty() => {
                let index = usize::from(connection) % connections.len();
                connections[index].queue = None;
            },
            Action::Drain { connection } if !connections.is_empty() => {
                let index = usize::from(connection) % connections.len();
                if let Some(queue) = connections[index].queue.as_mut() {
                    while queue.try_next().is_some() {}
                }
            },
            _ => {},
        }

        let directory = coordinator.directory();
        let snapshot = directory.snapshot();
        for room in snapshot.room_names() {
            let members = snapshot.members(room).unwrap_or_default();
            assert!(!members.is_empty(), "room {room} exists without members");
        }
        assert!(directory.member_count() <= connections.len());
        for connection in &connections {
            if connection.queue.is_some() && directory.is_member(&connection.handle) {
                assert!(!connection.handle.is_closed(), "closed handle still a member");
            }
        }
    }
});
