//! Live room: the set of connections currently joined to one room.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::foundation::{ClientId, RoomId, Timestamp, UserId};

use super::client::Client;

/// Members of one live room, keyed by user.
///
/// A user has at most one connection per room. A room only exists in the
/// hub registry while it has at least one member.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    is_private: bool,
    created_at: Timestamp,
    members: HashMap<UserId, Arc<Client>>,
}

impl Room {
    pub fn new(id: RoomId, is_private: bool) -> Self {
        Self {
            id,
            is_private,
            created_at: Timestamp::now(),
            members: HashMap::new(),
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn is_private(&self) -> bool {
        self.is_private
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Add a connection. Returns the user's previous connection if this one
    /// replaced it.
    pub fn insert(&mut self, client: Arc<Client>) -> Option<Arc<Client>> {
        let previous = self.members.insert(client.user_id(), client.clone())?;
        if previous.id() == client.id() {
            return None;
        }
        Some(previous)
    }

    /// Remove the user's entry, but only if it is still `client_id`.
    ///
    /// A stale unregister for a connection that was already replaced leaves
    /// the newer connection alone.
    pub fn remove_if_current(&mut self, user_id: UserId, client_id: ClientId) -> Option<Arc<Client>> {
        match self.members.get(&user_id) {
            Some(current) if current.id() == client_id => self.members.remove(&user_id),
            _ => None,
        }
    }

    pub fn get(&self, user_id: &UserId) -> Option<&Arc<Client>> {
        self.members.get(user_id)
    }

    pub fn members(&self) -> impl Iterator<Item = &Arc<Client>> {
        self.members.values()
    }

    pub fn into_members(self) -> impl Iterator<Item = Arc<Client>> {
        self.members.into_values()
    }

    /// Users present, in a stable order.
    pub fn user_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.members.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Users present with their display names, ordered by user id.
    pub fn presence(&self) -> Vec<(UserId, String)> {
        let mut present: Vec<(UserId, String)> = self
            .members
            .iter()
            .map(|(id, client)| (*id, client.username().to_owned()))
            .collect();
        present.sort_by_key(|(id, _)| *id);
        present
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
