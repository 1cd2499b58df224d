//! HTTP middleware for axum.
//!
//! - `auth` - Session token middleware and the `RequireAuth` extractor

pub mod auth;

pub use auth::{auth_middleware, session_token, AuthRejection, AuthState, RequireAuth, SESSION_COOKIE};
