//! HTTP adapters - cross-cutting middleware for the axum surface.

pub mod middleware;
