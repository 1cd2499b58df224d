//! In-memory adapters for the room directory and message persistence ports.
//!
//! Used by tests and by the development binary. Nothing here survives a
//! restart.

mod message_persister;
mod room_directory;

pub use message_persister::InMemoryMessagePersister;
pub use room_directory::InMemoryRoomDirectory;
