//! A single room and its members.

use std::collections::{HashMap, hash_map::Entry};

use crate::handle::ClientHandle;

/// A named set of members, keyed by user id.
///
/// A user id maps to at most one handle. Rooms never outlive their last
/// member; [`RoomDirectory`](crate::RoomDirectory) removes them as soon as
/// they empty.
#[derive(Debug)]
pub struct Room<I> {
    name: String,
    members: HashMap<String, ClientHandle>,
    created_at: I,
}

impl<I: Copy> Room<I> {
    /// Create an empty room.
    pub fn new(name: impl Into<String>, created_at: I) -> Self {
        Self { name: name.into(), members: HashMap::new(), created_at }
    }

    /// Room name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// When the room was created.
    pub fn created_at(&self) -> I {
        self.created_at
    }

    /// Add a member, returning the handle it replaced under the same user id.
    pub fn insert(&mut self, handle: ClientHandle) -> Option<ClientHandle> {
        self.members.insert(handle.user_id().to_owned(), handle)
    }

    /// Remove `handle` if it is the member currently mapped under its user id.
    ///
    /// A handle that was replaced by a later join with the same user id is
    /// not a member and removing it is a no-op.
    pub fn remove(&mut self, handle: &ClientHandle) -> Option<ClientHandle> {
        match self.members.entry(handle.user_id().to_owned()) {
            Entry::Occupied(entry) if entry.get().same_session(handle) => Some(entry.remove()),
            _ => None,
        }
    }

    /// Remove whatever member is mapped under `user_id`.
    pub fn remove_user(&mut self, user_id: &str) -> Option<ClientHandle> {
        self.members.remove(user_id)
    }

    /// Member currently mapped under `user_id`.
    pub fn get(&self, user_id: &str) -> Option<&ClientHandle> {
        self.members.get(user_id)
    }

    /// Whether `handle` is the current member under its user id.
    pub fn contains(&self, handle: &ClientHandle) -> bool {
        self.get(handle.user_id()).is_some_and(|member| member.same_session(handle))
    }

    /// Iterate over the members (unordered).
    pub fn members(&self) -> impl Iterator<Item = &ClientHandle> {
        self.members.values()
    }

    /// Member user ids, sorted.
    pub fn member_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.members.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the room has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(crate) fn into_members(self) -> impl Iterator<Item = ClientHandle> {
        self.members.into_values()
    }
}
