//! Room directory.
//!
//! Maps room names to rooms. The directory upholds the rule that a room
//! exists iff it has at least one member: rooms are created by the first join
//! and removed in the same step that removes their last member. All mutation
//! goes through methods here so callers cannot leave an empty room behind.

use std::collections::{BTreeMap, HashMap};

use crate::{
    channel::Outbound,
    error::DeliveryError,
    handle::ClientHandle,
    room::Room,
};

/// Result of adding a member.
#[derive(Debug)]
pub struct JoinResult {
    /// Whether the join created the room
    pub created_room: bool,
    /// Member displaced by this join (same user id, earlier session)
    pub replaced: Option<ClientHandle>,
    /// Room size after the join
    pub members: usize,
}

/// Result of removing a member.
#[derive(Debug)]
pub enum LeaveResult<I> {
    /// The handle was not the current member of its room
    NotMember,
    /// The handle was removed
    Left {
        /// The removed handle
        handle: ClientHandle,
        /// The room, if this removal emptied and deleted it
        closed_room: Option<Room<I>>,
    },
}

/// Result of fanning a message out to a room.
#[derive(Debug)]
pub struct FanOut<I> {
    /// Members the message was queued for
    pub delivered: usize,
    /// Members whose queue was full; they stay in the room
    pub dropped: usize,
    /// Members whose channel was closed; they were removed
    pub evicted: Vec<ClientHandle>,
    /// The room, if evictions emptied and deleted it
    pub closed_room: Option<Room<I>>,
}

/// Sorted, read-only view of the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    rooms: BTreeMap<String, Vec<String>>,
}

impl DirectorySnapshot {
    /// Number of rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Total members across all rooms.
    pub fn member_count(&self) -> usize {
        self.rooms.values().map(Vec::len).sum()
    }

    /// Sorted member ids of `room`, or `None` if the room does not exist.
    pub fn members(&self, room: &str) -> Option<&[String]> {
        self.rooms.get(room).map(Vec::as_slice)
    }

    /// Whether `room` exists.
    pub fn contains_room(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    /// Room names, sorted.
    pub fn room_names(&self) -> impl Iterator<Item = &str> {
        self.rooms.keys().map(String::as_str)
    }
}

/// All rooms on this relay.
#[derive(Debug)]
pub struct RoomDirectory<I> {
    rooms: HashMap<String, Room<I>>,
}

impl<I: Copy> Default for RoomDirectory<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Copy> RoomDirectory<I> {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self { rooms: HashMap::new() }
    }

    /// Add `handle` to its room, creating the room if needed.
    ///
    /// An existing member with the same user id is replaced and returned; it
    /// is not closed.
    pub fn join(&mut self, handle: ClientHandle, now: I) -> JoinResult {
        let created_room = !self.rooms.contains_key(handle.room());
        let room = self
            .rooms
            .entry(handle.room().to_owned())
            .or_insert_with(|| Room::new(handle.room(), now));
        let replaced = room.insert(handle);
        JoinResult { created_room, replaced, members: room.len() }
    }

    /// Remove `handle` from its room, deleting the room if it empties.
    ///
    /// Removing a handle that is not a member (never joined, already
    /// removed, or replaced) is a no-op.
    pub fn leave(&mut self, handle: &ClientHandle) -> LeaveResult<I> {
        let Some(room) = self.rooms.get_mut(handle.room()) else {
            return LeaveResult::NotMember;
        };
        let Some(removed) = room.remove(handle) else {
            return LeaveResult::NotMember;
        };
        let closed_room = if room.is_empty() { self.rooms.remove(handle.room()) } else { None };
        LeaveResult::Left { handle: removed, closed_room }
    }

    /// Queue `outbound` for every member of `room` except `skip_user`.
    ///
    /// Members whose channel is closed are removed before this returns, and
    /// the room is deleted if that empties it. Returns `None` if the room
    /// does not exist.
    pub fn broadcast(
        &mut self,
        room_name: &str,
        skip_user: &str,
        outbound: &Outbound,
    ) -> Option<FanOut<I>> {
        let room = self.rooms.get_mut(room_name)?;

        let mut delivered = 0;
        let mut dropped = 0;
        let mut dead = Vec::new();
        for member in room.members() {
            if member.user_id() == skip_user {
                continue;
            }
            match member.deliver(outbound.clone()) {
                Ok(()) => delivered += 1,
                Err(DeliveryError::Full) => dropped += 1,
                Err(DeliveryError::Closed) => dead.push(member.user_id().to_owned()),
            }
        }

        let evicted: Vec<ClientHandle> =
            dead.iter().filter_map(|user_id| room.remove_user(user_id)).collect();
        let closed_room = if room.is_empty() { self.rooms.remove(room_name) } else { None };

        Some(FanOut { delivered, dropped, evicted, closed_room })
    }

    /// Look up a room.
    pub fn room(&self, name: &str) -> Option<&Room<I>> {
        self.rooms.get(name)
    }

    /// Whether `handle` is the current member under its user id in its room.
    pub fn is_member(&self, handle: &ClientHandle) -> bool {
        self.room(handle.room()).is_some_and(|room| room.contains(handle))
    }

    /// Number of rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Total members across all rooms.
    pub fn member_count(&self) -> usize {
        self.rooms.values().map(Room::len).sum()
    }

    /// Whether there are no rooms.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Sorted copy of the current membership.
    pub fn snapshot(&self) -> DirectorySnapshot {
        let rooms = self
            .rooms
            .iter()
            .map(|(name, room)| (name.clone(), room.member_ids()))
            .collect();
        DirectorySnapshot { rooms }
    }

    /// Remove every room, returning all members.
    pub fn drain(&mut self) -> Vec<ClientHandle> {
        self.rooms.drain().flat_map(|(_, room)| room.into_members()).collect()
    }
}
