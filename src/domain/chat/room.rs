//! Durable room facts the hub needs at join time.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{HallId, RoomId};

/// The persisted room record, as far as the real-time layer cares.
///
/// The live membership set is a separate, in-memory structure owned by the
/// hub; this record only supplies the authorization inputs and the private
/// flag that the live room mirrors when it is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub id: RoomId,
    pub hall_id: HallId,
    pub name: String,
    pub is_private: bool,
}

impl RoomRecord {
    /// Creates a public room record.
    pub fn public(id: RoomId, hall_id: HallId, name: impl Into<String>) -> Self {
        Self {
            id,
            hall_id,
            name: name.into(),
            is_private: false,
        }
    }

    /// Creates a private room record.
    pub fn private(id: RoomId, hall_id: HallId, name: impl Into<String>) -> Self {
        Self {
            is_private: true,
            ..Self::public(id, hall_id, name)
        }
    }
}
