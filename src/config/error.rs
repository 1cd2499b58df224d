//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid host address")]
    InvalidHost,

    #[error("Queue capacity '{0}' must be greater than zero")]
    ZeroCapacity(&'static str),

    #[error("Persistence timeout must be greater than zero")]
    InvalidPersistTimeout,

    #[error("Pong wait must be at least 2 seconds so pings go out before it expires")]
    InvalidPongWait,

    #[error("Write wait must be greater than zero")]
    InvalidWriteWait,

    #[error("Maximum message size must be at least 1 KiB")]
    MessageSizeTooSmall,
}
