//! Configuration for the pull-consumer pipeline.
//!
//! Provides layered configuration loading with priority:
//! 1. Default values (hardcoded)
//! 2. Main config file (`config/pulley.toml`, optional)
//! 3. Explicit config file passed by the host application
//! 4. Environment variables (highest priority)

mod consumer;
mod flow;
mod stream;
pub use consumer::*;
pub use flow::*;
pub use stream::*;

//---
use crate::{Error, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    /// Stream creation and shutdown parameters
    #[serde(default)]
    pub stream: StreamSettings,
    /// Durable consumer parameters
    #[serde(default)]
    pub consumer: ConsumerConfig,
    /// Adaptive fetch tuning
    #[serde(default)]
    pub flow: FlowConfig,
}

impl Settings {
    /// Load configuration from multiple sources with priority:
    /// 1. Optional main config file
    /// 2. Explicit config file
    /// 3. Environment variables (`PULLEY__` prefixed)
    ///
    /// # Arguments
    /// * `config_path` - Optional path to an application-provided config file
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        builder = builder.add_source(File::with_name("config/pulley").required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("PULLEY")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()?
            .try_deserialize()
            .map_err(Error::Config)?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validates all subsystem configurations
    pub fn validate(&self) -> Result<()> {
        self.stream.validate()?;
        self.consumer.validate()?;
        self.flow.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod config_test;
#[cfg(test)]
mod flow_test;
