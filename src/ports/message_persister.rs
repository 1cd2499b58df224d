//! Message persistence port - the hub's persistence callback.
//!
//! The hub hands every validated `text` event to a [`MessagePersister`] and
//! broadcasts whatever canonical [`OutboundMessage`] comes back. The hub
//! bounds each call with a timeout and drops the future when it fires, so
//! implementations must not leave partial writes behind when cancelled
//! (wrap the write in a transaction).
//!
//! # Example
//!
//! ```ignore
//! struct PostgresMessagePersister { pool: PgPool }
//!
//! #[async_trait]
//! impl MessagePersister for PostgresMessagePersister {
//!     async fn persist(&self, message: &InboundMessage) -> Result<OutboundMessage, DomainError> {
//!         let mut tx = self.pool.begin().await?;
//!         // insert message, mentions, attachments ...
//!         tx.commit().await?;
//!         Ok(outbound)
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::domain::chat::{InboundMessage, OutboundMessage};
use crate::domain::foundation::DomainError;

/// Turns an inbound event into a durable, canonical outbound event.
///
/// Must be safe to call concurrently. The returned message should carry the
/// server-assigned `id` and the author/room taken from the inbound message,
/// never from anywhere else.
#[async_trait]
pub trait MessagePersister: Send + Sync {
    async fn persist(&self, message: &InboundMessage) -> Result<OutboundMessage, DomainError>;
}
