//! Chat domain - message contracts and room records.

mod message;
mod room;

pub use message::{
    Attachment, AttachmentDescriptor, InboundFrame, InboundMessage, MentionedUser, MessageKind,
    OutboundMessage, MAX_CONTENT_CHARS,
};
pub use room::RoomRecord;
