//! Real-time hub configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Sizing and timing for the message hub and its connections.
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Outbound frames buffered per connection before it counts as a slow consumer
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Inbound events waiting for classification
    #[serde(default = "default_inbound_capacity")]
    pub inbound_capacity: usize,

    /// Outbound events waiting for fan-out
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,

    /// Pending register/unregister events
    #[serde(default = "default_lifecycle_capacity")]
    pub lifecycle_capacity: usize,

    /// Upper bound on one persistence call, in milliseconds
    #[serde(default = "default_persist_timeout_ms")]
    pub persist_timeout_ms: u64,

    /// How long a connection may stay silent (no pong) before it is dropped
    #[serde(default = "default_pong_wait_secs")]
    pub pong_wait_secs: u64,

    /// Deadline for writing one frame to a connection
    #[serde(default = "default_write_wait_secs")]
    pub write_wait_secs: u64,

    /// Largest inbound frame accepted, in bytes
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl HubConfig {
    /// Persistence timeout as Duration
    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }

    /// Read deadline, refreshed by every pong
    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    /// Keepalive ping interval, 9/10 of the pong wait
    pub fn ping_period(&self) -> Duration {
        self.pong_wait() * 9 / 10
    }

    /// Per-frame write deadline
    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }

    /// Validate hub configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let capacities = [
            ("mailbox_capacity", self.mailbox_capacity),
            ("inbound_capacity", self.inbound_capacity),
            ("outbound_capacity", self.outbound_capacity),
            ("lifecycle_capacity", self.lifecycle_capacity),
        ];
        if let Some((name, _)) = capacities.iter().find(|(_, value)| *value == 0) {
            return Err(ValidationError::ZeroCapacity(name));
        }
        if self.persist_timeout_ms == 0 {
            return Err(ValidationError::InvalidPersistTimeout);
        }
        if self.pong_wait_secs < 2 {
            return Err(ValidationError::InvalidPongWait);
        }
        if self.write_wait_secs == 0 {
            return Err(ValidationError::InvalidWriteWait);
        }
        if self.max_message_bytes < 1024 {
            return Err(ValidationError::MessageSizeTooSmall);
        }
        Ok(())
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: default_mailbox_capacity(),
            inbound_capacity: default_inbound_capacity(),
            outbound_capacity: default_outbound_capacity(),
            lifecycle_capacity: default_lifecycle_capacity(),
            persist_timeout_ms: default_persist_timeout_ms(),
            pong_wait_secs: default_pong_wait_secs(),
            write_wait_secs: default_write_wait_secs(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

fn default_mailbox_capacity() -> usize {
    1024
}

fn default_inbound_capacity() -> usize {
    256
}

fn default_outbound_capacity() -> usize {
    256
}

fn default_lifecycle_capacity() -> usize {
    64
}

fn default_persist_timeout_ms() -> u64 {
    2000
}

fn default_pong_wait_secs() -> u64 {
    60
}

fn default_write_wait_secs() -> u64 {
    10
}

fn default_max_message_bytes() -> usize {
    64 * 1024
}
