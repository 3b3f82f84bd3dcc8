//! Configuration loading and validation.
//!
//! Sources, later ones overriding earlier ones:
//! 1. `.env` in the working directory (if present)
//! 2. an optional TOML file
//! 3. environment variables prefixed with `RELAY_`, nested with `__`
//!    (`RELAY_MAX_CONCURRENT=50`, `RELAY_LOGGING__LEVEL=debug`)
//!
//! Every key is optional; getters fall back to defaults.

use crate::common::RateLimiterConfig;
use crate::invoker::DEFAULT_MAX_RETRIES;
use ::config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MAX_CONCURRENT: usize = 100;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const ENV_PREFIX: &str = "RELAY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(String),

    #[error("Invalid configuration value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Logger setup failed: {0}")]
    Logger(String),
}

impl From<::config::ConfigError> for ConfigError {
    fn from(err: ::config::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error (default: info)
    level: Option<String>,
    /// Append logs to this file instead of stderr
    file: Option<String>,
}

impl LoggingConfig {
    pub fn new(level: impl Into<String>, file: Option<String>) -> Self {
        Self {
            level: Some(level.into()),
            file,
        }
    }

    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }
}

/// Settings for the invoker and dispatcher.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    /// Throttle retries per invocation (default: 5)
    max_retries: Option<u32>,
    /// Batch size for dispatches (default: 100)
    max_concurrent: Option<usize>,
    /// Overall dispatch deadline in seconds (default: none)
    deadline_secs: Option<u64>,
    /// Client-side pacing rate (default: no pacing)
    requests_per_second: Option<u32>,
    /// Pacing burst size (default: requests_per_second)
    burst_size: Option<u32>,
    #[serde(default)]
    logging: LoggingConfig,
}

impl RelayConfig {
    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.unwrap_or(DEFAULT_MAX_CONCURRENT)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    pub fn pacing(&self) -> Option<RateLimiterConfig> {
        self.requests_per_second
            .map(|requests_per_second| RateLimiterConfig {
                requests_per_second,
                burst_size: self.burst_size,
            })
    }

    pub fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = Some(max_concurrent);
        self
    }

    pub fn with_deadline_secs(mut self, deadline_secs: u64) -> Self {
        self.deadline_secs = Some(deadline_secs);
        self
    }

    /// Reject values that would make the invoker or dispatcher unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries() == 0 {
            return Err(ConfigError::Invalid {
                field: "max_retries",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_concurrent() == 0 {
            return Err(ConfigError::Invalid {
                field: "max_concurrent",
                reason: "must be a positive integer".to_string(),
            });
        }
        if self.deadline_secs == Some(0) {
            return Err(ConfigError::Invalid {
                field: "deadline_secs",
                reason: "must be greater than zero when set".to_string(),
            });
        }
        if self.requests_per_second == Some(0) {
            return Err(ConfigError::Invalid {
                field: "requests_per_second",
                reason: "must be greater than zero when set".to_string(),
            });
        }
        if self.burst_size == Some(0) {
            return Err(ConfigError::Invalid {
                field: "burst_size",
                reason: "must be greater than zero when set".to_string(),
            });
        }
        if crate::logger::parse_level(self.logging.level()).is_none() {
            return Err(ConfigError::Invalid {
                field: "logging.level",
                reason: format!("unknown level '{}'", self.logging.level()),
            });
        }
        Ok(())
    }
}

/// Load `.env`, the optional file at `path`, and `RELAY_*` variables, then validate.
pub fn load_config(path: Option<&Path>) -> Result<RelayConfig, ConfigError> {
    dotenv::dotenv().ok();

    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }
    let config = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let relay_config: RelayConfig = config.try_deserialize()?;
    relay_config.validate()?;
    log::debug!("Loaded configuration: {:?}", relay_config);
    Ok(relay_config)
}
