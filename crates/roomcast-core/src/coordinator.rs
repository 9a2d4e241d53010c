//! The coordinator: single owner of room membership.
//!
//! Events arrive on one bounded queue and are applied one at a time, each to
//! completion. Events a step generates itself (the welcome broadcast after a
//! register) go on an internal queue that is drained before the next external
//! event is taken, so a joiner's welcome always precedes anything the joiner
//! sends afterwards.

use std::collections::VecDeque;

use bytes::Bytes;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    directory::{DirectorySnapshot, LeaveResult, RoomDirectory},
    env::Environment,
    error::CoordinatorError,
    event::{Broadcast, Event},
    handle::ClientHandle,
};

/// What applying one event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A handle joined its room
    Registered {
        /// Whether the room was created by this join
        created_room: bool,
        /// Session displaced under the same user id
        replaced: Option<u64>,
    },
    /// A handle left its room
    Unregistered {
        /// Whether the room was deleted
        room_deleted: bool,
    },
    /// A message was fanned out
    Broadcast {
        /// Members it was queued for
        delivered: usize,
        /// Members skipped because their queue was full
        dropped: usize,
        /// Members removed because their channel was closed
        evicted: usize,
        /// Whether evictions deleted the room
        room_deleted: bool,
    },
    /// The event referred to a missing member or room
    Ignored,
}

enum Command {
    Event(Event),
    Snapshot(oneshot::Sender<DirectorySnapshot>),
}

/// Owns the [`RoomDirectory`] and applies events to it.
pub struct Coordinator<E: Environment> {
    env: E,
    directory: RoomDirectory<E::Instant>,
    pending: VecDeque<Event>,
}

impl<E: Environment> Coordinator<E> {
    /// Create a coordinator with an empty directory.
    pub fn new(env: E) -> Self {
        Self { env, directory: RoomDirectory::new(), pending: VecDeque::new() }
    }

    /// Read-only view of the directory.
    pub fn directory(&self) -> &RoomDirectory<E::Instant> {
        &self.directory
    }

    /// Events generated by earlier steps and not yet applied.
    pub fn pending(&self) -> impl Iterator<Item = &Event> {
        self.pending.iter()
    }

    /// Apply `event`, then every event it generated, in order.
    ///
    /// Returns the outcome of each step, starting with `event` itself.
    pub fn apply(&mut self, event: Event) -> Vec<Outcome> {
        let mut outcomes = vec![self.step(event)];
        while let Some(generated) = self.pending.pop_front() {
            outcomes.push(self.step(generated));
        }
        outcomes
    }

    /// Apply a single event. Generated events are queued, not applied.
    pub fn step(&mut self, event: Event) -> Outcome {
        match event {
            Event::Register(handle) => self.register(handle),
            Event::Unregister(handle) => self.unregister(&handle),
            Event::Broadcast(broadcast) => self.broadcast(&broadcast),
        }
    }

    fn register(&mut self, handle: ClientHandle) -> Outcome {
        let now = self.env.now();
        let welcome = Broadcast::welcome(handle.room(), handle.user_id());
        let session_id = handle.session_id();
        let user_id = handle.user_id().to_owned();
        let room = handle.room().to_owned();

        let joined = self.directory.join(handle, now);
        if joined.created_room {
            tracing::info!(room = %room, "room created");
        }
        if let Some(previous) = &joined.replaced {
            tracing::warn!(
                user_id = %user_id,
                room = %room,
                previous_session = previous.session_id(),
                session_id,
                "user id already in room, replacing previous member"
            );
        }
        tracing::info!(user_id = %user_id, room = %room, session_id, members = joined.members, "member joined");

        self.pending.push_back(Event::Broadcast(welcome));
        Outcome::Registered {
            created_room: joined.created_room,
            replaced: joined.replaced.map(|previous| previous.session_id()),
        }
    }

    fn unregister(&mut self, handle: &ClientHandle) -> Outcome {
        match self.directory.leave(handle) {
            LeaveResult::NotMember => {
                tracing::debug!(
                    user_id = handle.user_id(),
                    room = handle.room(),
                    session_id = handle.session_id(),
                    "unregister for non-member ignored"
                );
                Outcome::Ignored
            },
            LeaveResult::Left { handle, closed_room } => {
                handle.close();
                tracing::info!(
                    user_id = handle.user_id(),
                    room = handle.room(),
                    session_id = handle.session_id(),
                    "member left"
                );
                let room_deleted = closed_room.is_some();
                if let Some(room) = closed_room {
                    self.log_room_deleted(room.name(), room.created_at());
                }
                Outcome::Unregistered { room_deleted }
            },
        }
    }

    fn broadcast(&mut self, broadcast: &Broadcast) -> Outcome {
        let outbound = broadcast.outbound();
        let Some(report) =
            self.directory.broadcast(&broadcast.room, broadcast.sender.excluded(), &outbound)
        else {
            tracing::debug!(room = %broadcast.room, "broadcast to missing room dropped");
            return Outcome::Ignored;
        };

        if report.dropped > 0 {
            tracing::warn!(
                room = %broadcast.room,
                sender = broadcast.sender.identity(),
                dropped = report.dropped,
                "outbound queue full, message dropped for slow members"
            );
        }
        for evicted in &report.evicted {
            evicted.close();
            tracing::info!(
                user_id = evicted.user_id(),
                room = evicted.room(),
                session_id = evicted.session_id(),
                "member removed after failed delivery"
            );
        }
        let room_deleted = report.closed_room.is_some();
        if let Some(room) = report.closed_room {
            self.log_room_deleted(room.name(), room.created_at());
        }
        tracing::trace!(
            room = %broadcast.room,
            sender = broadcast.sender.identity(),
            delivered = report.delivered,
            bytes = broadcast.payload.len(),
            "broadcast"
        );

        Outcome::Broadcast {
            delivered: report.delivered,
            dropped: report.dropped,
            evicted: report.evicted.len(),
            room_deleted,
        }
    }

    fn log_room_deleted(&self, room: &str, created_at: E::Instant) {
        let lifetime = self.env.now() - created_at;
        tracing::info!(room, lifetime_ms = lifetime.as_millis() as u64, "room deleted");
    }

    /// Spawn the coordinator loop on the current runtime.
    ///
    /// The loop runs until every [`CoordinatorHandle`] has been dropped, then
    /// closes any remaining members and exits.
    pub fn spawn(self, queue_capacity: usize) -> (CoordinatorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let task = tokio::spawn(self.run(rx));
        (CoordinatorHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        tracing::debug!("coordinator started");
        while let Some(command) = rx.recv().await {
            match command {
                Command::Event(event) => {
                    tracing::trace!(kind = event.kind(), "event");
                    self.apply(event);
                },
                Command::Snapshot(reply) => {
                    let _ = reply.send(self.directory.snapshot());
                },
            }
        }

        let remaining = self.directory.drain();
        for handle in &remaining {
            handle.close();
        }
        tracing::info!(closed = remaining.len(), "coordinator stopped");
    }
}

/// Cloneable submission side of a running coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    /// Queue an event, waiting for space if the queue is full.
    pub async fn submit(&self, event: Event) -> Result<(), CoordinatorError> {
        self.tx.send(Command::Event(event)).await.map_err(|_| CoordinatorError::Stopped)
    }

    /// Queue a register for `handle`.
    pub async fn register(&self, handle: ClientHandle) -> Result<(), CoordinatorError> {
        self.submit(Event::Register(handle)).await
    }

    /// Queue an unregister for `handle`.
    pub async fn unregister(&self, handle: ClientHandle) -> Result<(), CoordinatorError> {
        self.submit(Event::Unregister(handle)).await
    }

    /// Queue a broadcast from `handle`'s user to `handle`'s room.
    pub async fn broadcast(
        &self,
        handle: &ClientHandle,
        payload: Bytes,
    ) -> Result<(), CoordinatorError> {
        self.submit(Event::Broadcast(Broadcast::from_user(handle.room(), handle.user_id(), payload)))
            .await
    }

    /// Membership as of the moment the coordinator reaches this request.
    pub async fn snapshot(&self) -> Result<DirectorySnapshot, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Snapshot(reply)).await.map_err(|_| CoordinatorError::Stopped)?;
        rx.await.map_err(|_| CoordinatorError::Stopped)
    }

    /// Whether the coordinator loop has exited.
    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::channel::{OutboundQueue, queued_channel};

    #[derive(Clone)]
    struct TestEnv;

    impl Environment for TestEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            Instant::now()
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(0x42);
        }
    }

    fn client(session: u64, user: &str, room: &str) -> (ClientHandle, OutboundQueue) {
        let (channel, queue) = queued_channel(16);
        (ClientHandle::new(session, user, room, channel), queue)
    }

    fn drain(queue: &mut OutboundQueue) -> Vec<(String, Bytes)> {
        std::iter::from_fn(|| queue.try_next())
            .map(|m| (m.sender.to_string(), m.payload))
            .collect()
    }

    #[test]
    fn register_queues_welcome_without_applying_it() {
        let mut coordinator = Coordinator::new(TestEnv);
        let (alice, _qa) = client(1, "alice", "R");

        let outcome = coordinator.step(Event::Register(alice));
        assert_eq!(outcome, Outcome::Registered { created_room: true, replaced: None });
        assert_eq!(coordinator.pending().count(), 1);
    }

    #[test]
    fn welcome_reaches_others_but_not_joiner() {
        let mut coordinator = Coordinator::new(TestEnv);
        let (alice, mut qa) = client(1, "alice", "R");
        let (bob, mut qb) = client(2, "bob", "R");

        coordinator.apply(Event::Register(alice));
        let outcomes = coordinator.apply(Event::Register(bob));
        assert_eq!(outcomes.len(), 2);

        assert_eq!(drain(&mut qa), vec![("system".to_string(), Bytes::from("Welcome bob to room R!"))]);
        assert!(drain(&mut qb).is_empty());
    }

    #[test]
    fn duplicate_user_id_replaces_without_closing() {
        let mut coordinator = Coordinator::new(TestEnv);
        let (first, _q1) = client(1, "alice", "R");
        let (second, _q2) = client(2, "alice", "R");

        coordinator.apply(Event::Register(first.clone()));
        let outcomes = coordinator.apply(Event::Register(second.clone()));
        assert_eq!(outcomes[0], Outcome::Registered { created_room: false, replaced: Some(1) });
        assert!(!first.is_closed());

        // The displaced handle cannot evict its replacement.
        assert_eq!(coordinator.apply(Event::Unregister(first)), vec![Outcome::Ignored]);
        assert!(coordinator.directory().is_member(&second));
    }

    #[test]
    fn unregister_closes_handle_and_deletes_room() {
        let mut coordinator = Coordinator::new(TestEnv);
        let (alice, _qa) = client(1, "alice", "R");
        coordinator.apply(Event::Register(alice.clone()));

        let outcomes = coordinator.apply(Event::Unregister(alice.clone()));
        assert_eq!(outcomes, vec![Outcome::Unregistered { room_deleted: true }]);
        assert!(alice.is_closed());
        assert!(coordinator.directory().is_empty());
    }

    #[test]
    fn broadcast_to_missing_room_is_ignored() {
        let mut coordinator = Coordinator::new(TestEnv);
        let outcome = coordinator.step(Event::Broadcast(Broadcast::from_user("ghost", "x", &b"x"[..])));
        assert_eq!(outcome, Outcome::Ignored);
        assert!(coordinator.directory().is_empty());
    }

    #[tokio::test]
    async fn spawned_loop_serves_snapshots_and_stops_when_handles_drop() {
        let (handle, task) = Coordinator::new(TestEnv).spawn(8);
        let (alice, mut qa) = client(1, "alice", "R");

        handle.register(alice.clone()).await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.members("R").unwrap(), ["alice"]);

        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(alice.is_closed());
        assert!(qa.next().await.is_none());
    }
}
