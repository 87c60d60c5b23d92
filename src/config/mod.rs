use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

// Re-export component config types
pub use crate::client::ClientConfig;
pub use crate::live_data::PublisherConfig;

/// Complete application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidBrokerUrl(String),
    ZeroInterval(&'static str),
    EmptyValueRange { min: f64, max: f64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidBrokerUrl(url) => {
                write!(f, "invalid broker url '{}': must start with ws:// or wss://", url)
            }
            ConfigError::ZeroInterval(field) => write!(f, "{} must be greater than zero", field),
            ConfigError::EmptyValueRange { min, max } => {
                write!(f, "publisher value range is empty: min {} >= max {}", min, max)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl ClientConfig {
    /// Check the URL scheme and intervals.
    ///
    /// Heartbeats may be zero (disabled); the reconnect delay may not.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.broker_url.as_str();
        let has_host = url
            .strip_prefix("ws://")
            .or_else(|| url.strip_prefix("wss://"))
            .is_some_and(|rest| !rest.is_empty());
        if !has_host {
            return Err(ConfigError::InvalidBrokerUrl(self.broker_url.clone()));
        }

        if self.reconnect_delay_ms == 0 {
            return Err(ConfigError::ZeroInterval("reconnect_delay_ms"));
        }

        Ok(())
    }
}

impl PublisherConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("interval_ms"));
        }
        if self.min_value >= self.max_value {
            return Err(ConfigError::EmptyValueRange {
                min: self.min_value,
                max: self.max_value,
            });
        }
        Ok(())
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.client.validate()?;
        self.publisher.validate()
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Load from `STOMP_CONFIG` if set, otherwise defaults
pub fn load_from_env() -> Result<AppConfig> {
    match std::env::var("STOMP_CONFIG") {
        Ok(path) => load_config(path),
        Err(_) => {
            let config = AppConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}
