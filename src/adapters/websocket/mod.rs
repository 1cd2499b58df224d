//! WebSocket adapters for real-time chat rooms.
//!
//! # Architecture
//!
//! ```text
//!   GET /ws/rooms/:room_id ──► handler (auth + membership checks, upgrade)
//!                                  │
//!                                  ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                               Hub                                    │
//! │  lifecycle queue ──► registry (RoomId → Room → UserId → Client)      │
//! │  inbound queue   ──► classify: persist text, typing, drop reserved   │
//! │  outbound queue  ──► fan-out to every mailbox in the room            │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                  │
//!                                  ▼ try_deliver (never blocks)
//!              Client mailbox ──► write loop ──► socket
//! ```
//!
//! # Components
//!
//! - [`hub`] - registry, queues and workers
//! - [`room`] - live membership of one room
//! - [`client`] - one connection: mailbox plus read and write loops
//! - [`handler`] - axum join and presence endpoints

pub mod client;
pub mod handler;
pub mod hub;
pub mod room;

pub use client::{serve, Client, ConnectionTiming, DeliveryError, MailboxReceiver};
pub use handler::{
    authorize_join, join_room, room_clients, websocket_router, JoinError, OnlineUser,
    WebSocketState,
};
pub use hub::{Hub, HubError, TYPING_EXPIRY};
pub use room::Room;
