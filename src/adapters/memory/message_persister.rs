//! In-memory message persister.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::chat::{Attachment, InboundMessage, MentionedUser, MessageKind, OutboundMessage};
use crate::domain::foundation::{AttachmentId, DomainError, MessageId};
use crate::ports::MessagePersister;

/// Persister that keeps saved messages in a vector.
///
/// Ids are time-ordered, so saved messages sort by creation. Supports a
/// forced error and an artificial delay for exercising the hub's failure
/// and timeout paths.
#[derive(Debug, Default)]
pub struct InMemoryMessagePersister {
    saved: RwLock<Vec<OutboundMessage>>,
    force_error: RwLock<Option<DomainError>>,
    delay: RwLock<Option<Duration>>,
}

impl InMemoryMessagePersister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every call with `error`.
    pub fn with_error(self, error: DomainError) -> Self {
        *self.force_error.write().unwrap_or_else(PoisonError::into_inner) = Some(error);
        self
    }

    /// Sleeps for `delay` before doing anything.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.write().unwrap_or_else(PoisonError::into_inner) = Some(delay);
        self
    }

    pub fn clear_error(&self) {
        *self.force_error.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    // === Test Helpers ===

    pub fn saved_messages(&self) -> Vec<OutboundMessage> {
        self.saved
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn saved_count(&self) -> usize {
        self.saved.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl MessagePersister for InMemoryMessagePersister {
    async fn persist(&self, message: &InboundMessage) -> Result<OutboundMessage, DomainError> {
        let delay = *self.delay.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let forced = self
            .force_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(error) = forced {
            return Err(error);
        }

        let saved = OutboundMessage {
            kind: MessageKind::Text,
            id: Some(MessageId::new_time_ordered()),
            room_id: message.room_id(),
            author_id: message.user_id(),
            content: message.content.clone(),
            sent_at: message.sent_at,
            mentions_everyone: message.mention_everyone,
            mentions: message
                .mentions
                .iter()
                .map(|id| MentionedUser { id: *id, username: None })
                .collect(),
            attachments: message
                .attachments
                .iter()
                .map(|descriptor| Attachment::from_descriptor(AttachmentId::new(), descriptor))
                .collect(),
            edited_at: None,
            deleted_at: None,
            typing_user: None,
            error: None,
        };

        self.saved
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(saved.clone());

        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chat::{AttachmentDescriptor, InboundFrame};
    use crate::domain::foundation::{ErrorCode, RoomId, UserId};

    #[tokio::test]
    async fn persist_assigns_id_and_keeps_attribution() {
        let persister = InMemoryMessagePersister::new();
        let user = UserId::new();
        let room = RoomId::new();

        let saved = persister
            .persist(&InboundFrame::text("hi").stamp(user, room))
            .await
            .unwrap();

        assert!(saved.id.is_some());
        assert_eq!(saved.author_id, user);
        assert_eq!(saved.room_id, room);
        assert_eq!(saved.kind, MessageKind::Text);
        assert_eq!(persister.saved_count(), 1);
    }

    #[tokio::test]
    async fn persist_projects_mentions_and_attachments() {
        let persister = InMemoryMessagePersister::new();
        let mentioned = UserId::new();
        let mut frame = InboundFrame::text("look @bob");
        frame.mentions = Some(vec![mentioned]);
        frame.mention_everyone = Some(true);
        frame.attachments = Some(vec![AttachmentDescriptor {
            file_name: "plan.pdf".to_string(),
            url: "https://cdn.example.com/plan.pdf".to_string(),
            file_type: None,
            file_size: Some(2048),
        }]);

        let saved = persister
            .persist(&frame.stamp(UserId::new(), RoomId::new()))
            .await
            .unwrap();

        assert!(saved.mentions_everyone);
        assert_eq!(saved.mentions[0].id, mentioned);
        assert_eq!(saved.attachments[0].file_name, "plan.pdf");
        assert_eq!(saved.attachments[0].file_size, Some(2048));
    }

    #[tokio::test]
    async fn ids_are_ordered_by_creation() {
        let persister = InMemoryMessagePersister::new();
        let (user, room) = (UserId::new(), RoomId::new());

        let first = persister.persist(&InboundFrame::text("a").stamp(user, room)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        let second = persister.persist(&InboundFrame::text("b").stamp(user, room)).await.unwrap();

        assert!(first.id < second.id);
    }

    #[tokio::test]
    async fn forced_error_saves_nothing() {
        let persister = InMemoryMessagePersister::new()
            .with_error(DomainError::new(ErrorCode::DatabaseError, "disk full"));

        let result = persister
            .persist(&InboundFrame::text("hi").stamp(UserId::new(), RoomId::new()))
            .await;

        assert_eq!(result.unwrap_err().message, "disk full");
        assert_eq!(persister.saved_count(), 0);

        persister.clear_error();
        assert!(persister
            .persist(&InboundFrame::text("hi").stamp(UserId::new(), RoomId::new()))
            .await
            .is_ok());
    }
}
