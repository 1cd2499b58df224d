//! Room directory port - the authorization collaborator for joins.
//!
//! The join handler asks three questions before a connection is upgraded:
//!
//! 1. Does the room exist? ([`RoomDirectory::find_room`])
//! 2. Is the user a member of the hall that owns it? ([`RoomDirectory::is_hall_member`])
//! 3. For private rooms only: is the user a direct member? ([`RoomDirectory::is_room_member`])
//!
//! The backing store (halls, floors, rooms, memberships) lives outside the
//! hub; this trait is the whole surface the real-time layer needs from it.

use async_trait::async_trait;

use crate::domain::chat::RoomRecord;
use crate::domain::foundation::{DomainError, HallId, RoomId, UserId};

/// Read-only access to rooms and memberships.
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// Look up a room by id. `Ok(None)` means the room does not exist.
    async fn find_room(&self, room_id: &RoomId) -> Result<Option<RoomRecord>, DomainError>;

    /// Whether the user belongs to the hall.
    async fn is_hall_member(&self, hall_id: &HallId, user_id: &UserId)
        -> Result<bool, DomainError>;

    /// Whether the user is a direct member of the room.
    async fn is_room_member(&self, room_id: &RoomId, user_id: &UserId)
        -> Result<bool, DomainError>;
}
