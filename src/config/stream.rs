use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Stream creation and shutdown parameters.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    /// Replica count used when the stream has to be created
    #[serde(default = "default_num_replicas")]
    pub num_replicas: usize,

    /// How long disconnect waits for in-flight work before abandoning it
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_in_ms: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            num_replicas: default_num_replicas(),
            shutdown_grace_in_ms: default_shutdown_grace(),
        }
    }
}

impl StreamSettings {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_in_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_replicas == 0 {
            return Err(Error::Config(ConfigError::Message(
                "num_replicas must be greater than 0".into(),
            )));
        }

        Ok(())
    }
}

fn default_num_replicas() -> usize {
    3
}
// in ms
fn default_shutdown_grace() -> u64 {
    1000
}
