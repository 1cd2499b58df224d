//! Adapters - Implementations of port interfaces.
//!
//! - `auth` - Session token validation
//! - `http` - axum middleware
//! - `memory` - In-memory room directory and message persistence
//! - `websocket` - The real-time hub and its WebSocket endpoints

pub mod auth;
pub mod http;
pub mod memory;
pub mod websocket;
