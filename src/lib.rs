//! Yapp Hub - real-time chat room server
//!
//! Accepts authenticated WebSocket connections into chat rooms, persists
//! text messages through a pluggable persister, and fans events out to every
//! connection in a room without letting a slow reader hold anyone else up.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
