//! In-memory room directory.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::domain::chat::RoomRecord;
use crate::domain::foundation::{DomainError, HallId, RoomId, UserId};
use crate::ports::RoomDirectory;

/// Room directory backed by hash maps.
///
/// # Example
///
/// ```ignore
/// let directory = InMemoryRoomDirectory::new();
/// directory.add_room(RoomRecord::public(room_id, hall_id, "general"));
/// directory.add_hall_member(hall_id, user_id);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryRoomDirectory {
    rooms: RwLock<HashMap<RoomId, RoomRecord>>,
    hall_members: RwLock<HashSet<(HallId, UserId)>>,
    room_members: RwLock<HashSet<(RoomId, UserId)>>,
    /// Returned by every lookup while set
    force_error: RwLock<Option<DomainError>>,
}

impl InMemoryRoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a room record, replacing any with the same id.
    pub fn add_room(&self, room: RoomRecord) {
        write(&self.rooms).insert(room.id, room);
    }

    pub fn add_hall_member(&self, hall_id: HallId, user_id: UserId) {
        write(&self.hall_members).insert((hall_id, user_id));
    }

    pub fn add_room_member(&self, room_id: RoomId, user_id: UserId) {
        write(&self.room_members).insert((room_id, user_id));
    }

    pub fn remove_hall_member(&self, hall_id: HallId, user_id: UserId) {
        write(&self.hall_members).remove(&(hall_id, user_id));
    }

    /// Forces every lookup to fail with `error` (or clears it with `None`).
    pub fn set_error(&self, error: Option<DomainError>) {
        *write(&self.force_error) = error;
    }

    /// Builder form of [`set_error`](Self::set_error).
    pub fn with_error(self, error: DomainError) -> Self {
        self.set_error(Some(error));
        self
    }

    pub fn room_count(&self) -> usize {
        read(&self.rooms).len()
    }

    fn check_error(&self) -> Result<(), DomainError> {
        match read(&self.force_error).clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RoomDirectory for InMemoryRoomDirectory {
    async fn find_room(&self, room_id: &RoomId) -> Result<Option<RoomRecord>, DomainError> {
        self.check_error()?;
        Ok(read(&self.rooms).get(room_id).cloned())
    }

    async fn is_hall_member(&self, hall_id: &HallId, user_id: &UserId) -> Result<bool, DomainError> {
        self.check_error()?;
        Ok(read(&self.hall_members).contains(&(*hall_id, *user_id)))
    }

    async fn is_room_member(&self, room_id: &RoomId, user_id: &UserId) -> Result<bool, DomainError> {
        self.check_error()?;
        Ok(read(&self.room_members).contains(&(*room_id, *user_id)))
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::ErrorCode;

    #[tokio::test]
    async fn finds_added_rooms_only() {
        let directory = InMemoryRoomDirectory::new();
        let room = RoomRecord::public(RoomId::new(), HallId::new(), "general");
        directory.add_room(room.clone());

        assert_eq!(directory.find_room(&room.id).await.unwrap(), Some(room));
        assert_eq!(directory.find_room(&RoomId::new()).await.unwrap(), None);
        assert_eq!(directory.room_count(), 1);
    }

    #[tokio::test]
    async fn tracks_hall_membership() {
        let directory = InMemoryRoomDirectory::new();
        let hall = HallId::new();
        let user = UserId::new();

        assert!(!directory.is_hall_member(&hall, &user).await.unwrap());
        directory.add_hall_member(hall, user);
        assert!(directory.is_hall_member(&hall, &user).await.unwrap());
        directory.remove_hall_member(hall, user);
        assert!(!directory.is_hall_member(&hall, &user).await.unwrap());
    }

    #[tokio::test]
    async fn room_membership_is_per_room() {
        let directory = InMemoryRoomDirectory::new();
        let room = RoomId::new();
        let user = UserId::new();
        directory.add_room_member(room, user);

        assert!(directory.is_room_member(&room, &user).await.unwrap());
        assert!(!directory.is_room_member(&RoomId::new(), &user).await.unwrap());
    }

    #[tokio::test]
    async fn forced_error_fails_every_lookup() {
        let directory = InMemoryRoomDirectory::new()
            .with_error(DomainError::new(ErrorCode::DatabaseError, "down"));

        assert!(directory.find_room(&RoomId::new()).await.is_err());
        assert!(directory
            .is_hall_member(&HallId::new(), &UserId::new())
            .await
            .is_err());

        directory.set_error(None);
        assert!(directory.find_room(&RoomId::new()).await.is_ok());
    }
}
