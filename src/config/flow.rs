use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Tuning knobs of the adaptive fetch loop.
///
/// The batch size floats between `min_batch` and `max_batch` and the
/// fetch timeout between its own bounds; both adapt to observed traffic.
/// `occupancy_ratio` sets the share of the current batch size the local
/// queue may hold before pulling is suspended.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FlowConfig {
    /// Smallest batch ever requested from the broker
    #[serde(default = "default_min_batch")]
    pub min_batch: usize,

    /// Largest batch ever requested. Defaults to the consumer's
    /// max_ack_pending divided by 10 when unset
    #[serde(default)]
    pub max_batch: Option<usize>,

    /// Step by which the batch size grows or shrinks
    #[serde(default = "default_batch_step")]
    pub batch_step: usize,

    /// Lower bound of the fetch timeout
    #[serde(default = "default_min_fetch_timeout")]
    pub min_fetch_timeout_in_ms: u64,

    /// Upper bound of the fetch timeout
    #[serde(default = "default_max_fetch_timeout")]
    pub max_fetch_timeout_in_ms: u64,

    /// Fetch timeout used for the first pull after connect
    #[serde(default = "default_initial_fetch_timeout")]
    pub initial_fetch_timeout_in_ms: u64,

    /// Share of the current batch size the local queue may hold before
    /// pulling pauses
    #[serde(default = "default_occupancy_ratio")]
    pub occupancy_ratio: f64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            min_batch: default_min_batch(),
            max_batch: None,
            batch_step: default_batch_step(),
            min_fetch_timeout_in_ms: default_min_fetch_timeout(),
            max_fetch_timeout_in_ms: default_max_fetch_timeout(),
            initial_fetch_timeout_in_ms: default_initial_fetch_timeout(),
            occupancy_ratio: default_occupancy_ratio(),
        }
    }
}

impl FlowConfig {
    pub fn min_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.min_fetch_timeout_in_ms)
    }

    pub fn max_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.max_fetch_timeout_in_ms)
    }

    pub fn initial_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_fetch_timeout_in_ms)
    }

    /// Largest batch for a consumer allowing `max_ack_pending` unacked
    /// messages: the configured cap, or max_ack_pending / 10, never below
    /// `min_batch`.
    pub fn resolved_max_batch(&self, max_ack_pending: usize) -> usize {
        self.max_batch
            .unwrap_or(max_ack_pending / 10)
            .max(self.min_batch)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_batch == 0 {
            return Err(Error::Config(ConfigError::Message(
                "min_batch must be greater than 0".into(),
            )));
        }

        if self.batch_step == 0 {
            return Err(Error::Config(ConfigError::Message(
                "batch_step must be greater than 0".into(),
            )));
        }

        if let Some(max_batch) = self.max_batch {
            if max_batch < self.min_batch {
                return Err(Error::Config(ConfigError::Message(
                    "max_batch cannot be smaller than min_batch".into(),
                )));
            }
        }

        if self.min_fetch_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "min_fetch_timeout_in_ms must be at least 1ms".into(),
            )));
        }

        if self.max_fetch_timeout_in_ms < self.min_fetch_timeout_in_ms {
            return Err(Error::Config(ConfigError::Message(
                "max_fetch_timeout_in_ms cannot be smaller than min_fetch_timeout_in_ms".into(),
            )));
        }

        if self.initial_fetch_timeout_in_ms < self.min_fetch_timeout_in_ms
            || self.initial_fetch_timeout_in_ms > self.max_fetch_timeout_in_ms
        {
            return Err(Error::Config(ConfigError::Message(
                "initial_fetch_timeout_in_ms must lie between the min and max fetch timeouts".into(),
            )));
        }

        if !(self.occupancy_ratio > 0.0 && self.occupancy_ratio <= 1.0) {
            return Err(Error::Config(ConfigError::Message(
                "occupancy_ratio must lie in (0, 1]".into(),
            )));
        }

        Ok(())
    }
}

fn default_min_batch() -> usize {
    10
}
fn default_batch_step() -> usize {
    10
}
// in ms
fn default_min_fetch_timeout() -> u64 {
    10
}
fn default_max_fetch_timeout() -> u64 {
    1000
}
fn default_initial_fetch_timeout() -> u64 {
    100
}
fn default_occupancy_ratio() -> f64 {
    0.2
}
