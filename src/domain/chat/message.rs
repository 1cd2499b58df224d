//! Message contracts exchanged between clients and the hub.
//!
//! - Client → Server: [`InboundFrame`], decoded straight off the wire. It has
//!   no identity fields, so whatever `author_id`/`room_id` a client puts in
//!   its JSON is ignored by the decoder.
//! - Hub-internal: [`InboundMessage`], an inbound frame stamped with the
//!   connection's authenticated user and room.
//! - Server → Client: [`OutboundMessage`], the single frame shape fanned out
//!   to rooms or delivered point-to-point.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    AttachmentId, MessageId, RoomId, Timestamp, UserId, ValidationError,
};

/// Upper bound on the length of message content, in characters.
pub const MAX_CONTENT_CHARS: usize = 8000;

// ============================================
// Message kinds
// ============================================

/// Every message kind the protocol knows about.
///
/// `Join`, `Leave` and `Error` are produced by the server only. `Unknown`
/// absorbs any unrecognised `type` string so that an unfamiliar kind decodes
/// cleanly and is dropped by the classifier instead of tearing down the
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Typing,
    StopTyping,
    Read,
    Edit,
    Delete,
    React,

    // Server-only
    Join,
    Leave,
    Error,

    #[serde(other)]
    Unknown,
}

impl MessageKind {
    /// Returns true for kinds a client is never allowed to originate.
    pub fn is_server_only(&self) -> bool {
        matches!(self, MessageKind::Join | MessageKind::Leave | MessageKind::Error)
    }
}

// ============================================
// Attachments and mentions
// ============================================

/// Attachment metadata supplied by a client alongside a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    pub file_name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    /// Size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
}

/// Stored attachment as projected onto an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    pub file_name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
}

impl Attachment {
    /// Projects a client-supplied descriptor onto a freshly stored attachment.
    pub fn from_descriptor(id: AttachmentId, descriptor: &AttachmentDescriptor) -> Self {
        Self {
            id,
            file_name: descriptor.file_name.clone(),
            url: descriptor.url.clone(),
            file_type: descriptor.file_type.clone(),
            file_size: descriptor.file_size,
        }
    }
}

/// A mentioned user as projected onto an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionedUser {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

// ============================================
// Client → Server
// ============================================

/// One frame as decoded from a client connection.
///
/// Unknown JSON fields are ignored, which is what keeps client-supplied
/// `author_id`, `user_id` and `room_id` values out of the hub.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub kind: MessageKind,

    #[serde(default)]
    pub content: Option<String>,

    #[serde(default)]
    pub attachments: Option<Vec<AttachmentDescriptor>>,

    #[serde(default)]
    pub mention_everyone: Option<bool>,

    #[serde(default)]
    pub mentions: Option<Vec<UserId>>,

    #[serde(default)]
    pub sent_at: Option<Timestamp>,
}

impl InboundFrame {
    /// Creates an empty frame of the given kind.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            content: None,
            attachments: None,
            mention_everyone: None,
            mentions: None,
            sent_at: None,
        }
    }

    /// Creates a `text` frame carrying the given content.
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Text).with_content(content)
    }

    /// Sets the content.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Attributes the frame to the connection it arrived on.
    ///
    /// This is the only way to build an [`InboundMessage`]; identity always
    /// comes from the authenticated connection. A missing `sent_at` falls
    /// back to the server receipt time.
    pub fn stamp(self, user_id: UserId, room_id: RoomId) -> InboundMessage {
        InboundMessage {
            kind: self.kind,
            content: self.content,
            attachments: self.attachments.unwrap_or_default(),
            mention_everyone: self.mention_everyone.unwrap_or(false),
            mentions: self.mentions.unwrap_or_default(),
            sent_at: self.sent_at.unwrap_or_else(Timestamp::now),
            user_id,
            room_id,
        }
    }
}

/// An inbound event attributed to an authenticated connection.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub kind: MessageKind,
    pub content: Option<String>,
    pub attachments: Vec<AttachmentDescriptor>,
    pub mention_everyone: bool,
    pub mentions: Vec<UserId>,
    pub sent_at: Timestamp,
    user_id: UserId,
    room_id: RoomId,
}

impl InboundMessage {
    /// The authenticated author.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// The room the connection is registered in.
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Checks that a `text` event is worth persisting.
    ///
    /// Content, when present, must be 1..=8000 characters. A message with no
    /// content must carry at least one attachment.
    pub fn validate_text(&self) -> Result<(), ValidationError> {
        match &self.content {
            Some(content) => {
                let len = content.chars().count();
                if len == 0 || len > MAX_CONTENT_CHARS {
                    return Err(ValidationError::out_of_range(
                        "content",
                        1,
                        MAX_CONTENT_CHARS,
                        len,
                    ));
                }
                Ok(())
            }
            None if self.attachments.is_empty() => Err(ValidationError::empty_field("content")),
            None => Ok(()),
        }
    }
}

// ============================================
// Server → Client
// ============================================

/// The frame written to client connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Present once the message has been persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,

    pub room_id: RoomId,
    pub author_id: UserId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    pub sent_at: Timestamp,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub mentions_everyone: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<MentionedUser>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<Timestamp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,

    /// Set on `typing` / `stop_typing` indicators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typing_user: Option<UserId>,

    /// Human-readable reason, `error` frames only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutboundMessage {
    fn system(kind: MessageKind, room_id: RoomId, user_id: UserId) -> Self {
        Self {
            kind,
            id: None,
            room_id,
            author_id: user_id,
            content: None,
            sent_at: Timestamp::now(),
            mentions_everyone: false,
            mentions: Vec::new(),
            attachments: Vec::new(),
            edited_at: None,
            deleted_at: None,
            typing_user: None,
            error: None,
        }
    }

    /// Presence notice: `user_id` entered the room.
    pub fn join(room_id: RoomId, user_id: UserId) -> Self {
        Self::system(MessageKind::Join, room_id, user_id)
    }

    /// Presence notice: `user_id` left the room.
    pub fn leave(room_id: RoomId, user_id: UserId) -> Self {
        Self::system(MessageKind::Leave, room_id, user_id)
    }

    /// Typing indicator for `user_id`.
    pub fn typing(room_id: RoomId, user_id: UserId) -> Self {
        let mut msg = Self::system(MessageKind::Typing, room_id, user_id);
        msg.typing_user = Some(user_id);
        msg
    }

    /// End of a typing indicator for `user_id`.
    pub fn stop_typing(room_id: RoomId, user_id: UserId) -> Self {
        let mut msg = Self::system(MessageKind::StopTyping, room_id, user_id);
        msg.typing_user = Some(user_id);
        msg
    }

    /// Error addressed to `user_id` alone.
    pub fn error(room_id: RoomId, user_id: UserId, reason: impl Into<String>) -> Self {
        let mut msg = Self::system(MessageKind::Error, room_id, user_id);
        msg.error = Some(reason.into());
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_frame_decodes_text_with_mentions() {
        let mentioned = UserId::new();
        let json = format!(
            r#"{{"type":"text","content":"hi @bob","mentions":["{}"],"sent_at":"2025-01-10T00:00:00Z"}}"#,
            mentioned
        );

        let frame: InboundFrame = serde_json::from_str(&json).unwrap();

        assert_eq!(frame.kind, MessageKind::Text);
        assert_eq!(frame.content.as_deref(), Some("hi @bob"));
        assert_eq!(frame.mentions, Some(vec![mentioned]));
    }

    #[test]
    fn inbound_frame_decodes_unrecognised_kind_as_unknown() {
        let frame: InboundFrame = serde_json::from_str(r#"{"type":"dance"}"#).unwrap();
        assert_eq!(frame.kind, MessageKind::Unknown);
    }

    #[test]
    fn inbound_frame_without_type_is_rejected() {
        assert!(serde_json::from_str::<InboundFrame>(r#"{"content":"hi"}"#).is_err());
    }

    #[test]
    fn stamp_ignores_identity_claimed_in_payload() {
        let claimed_author = UserId::new();
        let claimed_room = RoomId::new();
        let json = format!(
            r#"{{"type":"text","content":"hi","author_id":"{}","user_id":"{}","room_id":"{}"}}"#,
            claimed_author, claimed_author, claimed_room
        );
        let frame: InboundFrame = serde_json::from_str(&json).unwrap();

        let actual_user = UserId::new();
        let actual_room = RoomId::new();
        let msg = frame.stamp(actual_user, actual_room);

        assert_eq!(msg.user_id(), actual_user);
        assert_eq!(msg.room_id(), actual_room);
    }

    #[test]
    fn stamp_defaults_missing_sent_at_to_now() {
        let before = Timestamp::now();
        let msg = InboundFrame::new(MessageKind::Typing).stamp(UserId::new(), RoomId::new());
        assert!(!msg.sent_at.is_before(&before));
    }

    #[test]
    fn validate_text_accepts_content_within_bounds() {
        let msg = InboundFrame::text("hello").stamp(UserId::new(), RoomId::new());
        assert!(msg.validate_text().is_ok());

        let max = InboundFrame::text("x".repeat(MAX_CONTENT_CHARS)).stamp(UserId::new(), RoomId::new());
        assert!(max.validate_text().is_ok());
    }

    #[test]
    fn validate_text_rejects_empty_and_oversized_content() {
        let empty = InboundFrame::text("").stamp(UserId::new(), RoomId::new());
        assert!(empty.validate_text().is_err());

        let long = InboundFrame::text("x".repeat(MAX_CONTENT_CHARS + 1)).stamp(UserId::new(), RoomId::new());
        assert!(matches!(
            long.validate_text(),
            Err(ValidationError::OutOfRange { actual, .. }) if actual == MAX_CONTENT_CHARS + 1
        ));
    }

    #[test]
    fn validate_text_counts_characters_not_bytes() {
        let msg = InboundFrame::text("é".repeat(MAX_CONTENT_CHARS)).stamp(UserId::new(), RoomId::new());
        assert!(msg.validate_text().is_ok());
    }

    #[test]
    fn validate_text_allows_attachment_only_messages() {
        let mut frame = InboundFrame::new(MessageKind::Text);
        frame.attachments = Some(vec![AttachmentDescriptor {
            file_name: "cat.png".to_string(),
            url: "https://cdn.example.com/cat.png".to_string(),
            file_type: Some("image/png".to_string()),
            file_size: Some(1024),
        }]);
        let msg = frame.stamp(UserId::new(), RoomId::new());
        assert!(msg.validate_text().is_ok());

        let bare = InboundFrame::new(MessageKind::Text).stamp(UserId::new(), RoomId::new());
        assert!(bare.validate_text().is_err());
    }

    #[test]
    fn outbound_typing_serializes_with_typing_user() {
        let user = UserId::new();
        let msg = OutboundMessage::typing(RoomId::new(), user);

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "typing");
        assert_eq!(json["typing_user"], user.to_string());
        assert!(json.get("error").is_none());
        assert!(json.get("id").is_none());
    }

    #[test]
    fn outbound_error_carries_reason() {
        let msg = OutboundMessage::error(RoomId::new(), UserId::new(), "could not save");

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["error"], "could not save");
    }

    #[test]
    fn server_only_kinds_are_flagged() {
        assert!(MessageKind::Join.is_server_only());
        assert!(MessageKind::Error.is_server_only());
        assert!(!MessageKind::Text.is_server_only());
        assert!(!MessageKind::Unknown.is_server_only());
    }
}
