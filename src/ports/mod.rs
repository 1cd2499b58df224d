//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between the
//! real-time hub and the rest of the system. Adapters implement these ports.
//!
//! - `SessionValidator` - session token → authenticated user
//! - `RoomDirectory` - room lookup and membership checks for joins
//! - `MessagePersister` - the persistence callback invoked for `text` events

mod message_persister;
mod room_directory;
mod session_validator;

pub use message_persister::MessagePersister;
pub use room_directory::RoomDirectory;
pub use session_validator::SessionValidator;
