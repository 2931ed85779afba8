use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Broker-side parameters of one durable pull consumer.
///
/// `ack_wait` is the redelivery deadline: a delivered message left
/// unacknowledged for longer is handed out again by the broker, so the
/// local pipeline must never dispatch a message whose deadline already
/// passed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Deadline (in milliseconds) for acknowledging a delivered message
    /// before the broker redelivers it
    #[serde(default = "default_ack_wait")]
    pub ack_wait_in_ms: u64,

    /// Maximum number of delivered-but-unacknowledged messages the broker
    /// keeps outstanding for this consumer
    #[serde(default = "default_max_ack_pending")]
    pub max_ack_pending: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            ack_wait_in_ms: default_ack_wait(),
            max_ack_pending: default_max_ack_pending(),
        }
    }
}

impl ConsumerConfig {
    pub fn ack_wait(&self) -> Duration {
        Duration::from_millis(self.ack_wait_in_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ack_wait_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "ack_wait_in_ms must be at least 1ms".into(),
            )));
        }

        if self.max_ack_pending == 0 {
            return Err(Error::Config(ConfigError::Message(
                "max_ack_pending must be greater than 0".into(),
            )));
        }

        Ok(())
    }
}

// in ms
fn default_ack_wait() -> u64 {
    30_000
}
fn default_max_ack_pending() -> usize {
    1000
}
