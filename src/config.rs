//! Configuration management for the submission limiter.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{LimiterError, Result};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "SUBMISSION_LIMITER";

/// Main configuration for the submission limiter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Rate limiting configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// What to do when the backing store cannot be read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailurePolicy {
    /// Return the store error to the caller
    #[default]
    Propagate,
    /// Admit the submission
    FailOpen,
    /// Reject the submission as if the client were too fast
    FailClosed,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Submissions allowed inside one window before rejecting as too fast
    #[serde(default = "default_burst_limit")]
    pub burst_limit: u64,

    /// Length of the burst window in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Message returned with a too-fast rejection
    #[serde(default = "default_limit_message")]
    pub limit_message: String,

    /// Serialized tables larger than this are discarded
    #[serde(default = "default_max_stored_bytes")]
    pub max_stored_bytes: usize,

    /// TTL applied to the persisted table on every write
    #[serde(default = "default_store_ttl_secs")]
    pub store_ttl_secs: u64,

    /// Lifetime submission cap per client
    #[serde(default = "default_max_total")]
    pub max_total: u64,

    /// Message returned once the lifetime cap is reached
    #[serde(default = "default_max_total_message")]
    pub max_total_message: String,

    /// Store key holding the whole counter table
    #[serde(default = "default_store_key")]
    pub store_key: String,

    /// Behaviour when the store is unavailable
    #[serde(default)]
    pub on_store_error: StoreFailurePolicy,

    /// Conditional-write retries on a concurrent update (0 disables)
    #[serde(default)]
    pub optimistic_retries: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            burst_limit: default_burst_limit(),
            window_secs: default_window_secs(),
            limit_message: default_limit_message(),
            max_stored_bytes: default_max_stored_bytes(),
            store_ttl_secs: default_store_ttl_secs(),
            max_total: default_max_total(),
            max_total_message: default_max_total_message(),
            store_key: default_store_key(),
            on_store_error: StoreFailurePolicy::default(),
            optimistic_retries: 0,
        }
    }
}

fn default_burst_limit() -> u64 {
    2
}

fn default_window_secs() -> u64 {
    60
}

fn default_limit_message() -> String {
    "Sorry, we are receiving a high volume at this time. Please try again in a minute or reach out to us by phone.".to_string()
}

fn default_max_stored_bytes() -> usize {
    512 * 1024
}

fn default_store_ttl_secs() -> u64 {
    3600
}

fn default_max_total() -> u64 {
    100
}

fn default_max_total_message() -> String {
    "You have reached the maximum number of submissions allowed.".to_string()
}

fn default_store_key() -> String {
    "submission_limiter_table".to_string()
}

impl LimiterConfig {
    /// TTL applied to the persisted table.
    pub fn store_ttl(&self) -> Duration {
        Duration::from_secs(self.store_ttl_secs)
    }

    /// Check that the configuration can drive a limiter.
    pub fn validate(&self) -> Result<()> {
        if self.window_secs == 0 {
            return Err(LimiterError::Config(
                "window_secs must be greater than 0".into(),
            ));
        }
        if self.max_total == 0 {
            return Err(LimiterError::Config(
                "max_total must be greater than 0".into(),
            ));
        }
        if self.max_stored_bytes == 0 {
            return Err(LimiterError::Config(
                "max_stored_bytes must be greater than 0".into(),
            ));
        }
        if self.store_key.trim().is_empty() {
            return Err(LimiterError::Config("store_key cannot be empty".into()));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level or filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON formatted log lines
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(yaml)
            .map_err(|e| LimiterError::Config(format!("Failed to parse config: {}", e)))?;
        config.limiter.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from an optional file with environment overrides.
    ///
    /// Variables look like `SUBMISSION_LIMITER__LIMITER__BURST_LIMIT=5`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.limiter.validate()?;
        Ok(config)
    }
}
