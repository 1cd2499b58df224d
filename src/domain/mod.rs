//! Domain layer containing the chat vocabulary.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, auth, errors)
//! - `chat` - Wire message contracts and room records

pub mod chat;
pub mod foundation;
