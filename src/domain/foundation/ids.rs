//! Strongly-typed identifier value objects.
//!
//! Every identifier in the chat domain is a UUID on the wire. Wrapping each
//! one in its own newtype keeps a `RoomId` from being handed to something
//! that expects a `UserId`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates the identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(
    /// Identifier of a persisted room (the durable record, not the live set).
    RoomId
);

uuid_id!(
    /// Identifier of a hall, the container rooms belong to.
    HallId
);

uuid_id!(
    /// Identifier of an authenticated user.
    UserId
);

uuid_id!(
    /// Server-side identity of one physical connection.
    ///
    /// A user reconnecting to the same room gets a fresh `ClientId`, which is
    /// how the hub tells a stale connection from its replacement.
    ClientId
);

uuid_id!(
    /// Identifier of a persisted chat message.
    MessageId
);

uuid_id!(
    /// Identifier of a stored attachment.
    AttachmentId
);

impl MessageId {
    /// Creates a time-ordered (v7) message id so ids sort by creation time.
    pub fn new_time_ordered() -> Self {
        Self(Uuid::now_v7())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_id_parses_from_valid_uuid() {
        let raw = "1f0a4b8e-7c55-4a55-9d35-2f1b0c0f9e11";
        let id: RoomId = raw.parse().unwrap();
        assert_eq!(id.to_string(), raw);
    }

    #[test]
    fn room_id_rejects_garbage() {
        assert!("not-a-room".parse::<RoomId>().is_err());
    }

    #[test]
    fn user_id_serializes_as_bare_uuid() {
        let uuid = Uuid::new_v4();
        let json = serde_json::to_string(&UserId::from_uuid(uuid)).unwrap();
        assert_eq!(json, format!("\"{}\"", uuid));
    }

    #[test]
    fn client_ids_are_unique() {
        assert_ne!(ClientId::new(), ClientId::new());
    }

    #[test]
    fn time_ordered_message_ids_sort_by_creation() {
        let first = MessageId::new_time_ordered();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = MessageId::new_time_ordered();
        assert!(first < second);
    }
}
