use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EventError, Result};
use crate::transport::redis::RedisConfig;
use crate::types::SubscribeOptions;

/// Settings for the event bus, its broker and its stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventsConfig {
    /// Broker connection
    #[serde(default)]
    pub redis: RedisConfig,

    /// Defaults applied to subscriptions created without explicit options
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Stores (history and dead-letter TTLs)
    #[serde(default)]
    pub stores: StoreConfig,
}

/// Subscription defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryConfig {
    /// Subscribe by glob pattern (default: true)
    #[serde(default = "default_pattern")]
    pub pattern: bool,

    /// Handler attempts per event (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Waits between attempts, in milliseconds (default: 1000, 5000, 10000)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: Vec<u64>,

    /// Per-attempt handler deadline in seconds; 0 disables it (default: 30)
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,
}

fn default_pattern() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> Vec<u64> {
    vec![1_000, 5_000, 10_000]
}

fn default_handler_timeout_secs() -> u64 {
    30
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            handler_timeout_secs: default_handler_timeout_secs(),
        }
    }
}

impl DeliveryConfig {
    /// Subscription options these defaults describe
    pub fn to_options(&self) -> SubscribeOptions {
        SubscribeOptions {
            pattern: self.pattern,
            max_retries: self.max_retries,
            retry_backoff: self
                .retry_backoff_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            handler_timeout: (self.handler_timeout_secs > 0)
                .then(|| Duration::from_secs(self.handler_timeout_secs)),
        }
    }
}

/// Lifetimes of stored history entries and dead letters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// History entry TTL in seconds (default: 86400)
    #[serde(default = "default_ttl_secs")]
    pub history_ttl_secs: u64,

    /// Dead-letter TTL in seconds (default: 86400)
    #[serde(default = "default_ttl_secs")]
    pub dead_letter_ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    24 * 60 * 60
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            history_ttl_secs: default_ttl_secs(),
            dead_letter_ttl_secs: default_ttl_secs(),
        }
    }
}

impl StoreConfig {
    pub fn history_ttl(&self) -> Duration {
        Duration::from_secs(self.history_ttl_secs)
    }

    pub fn dead_letter_ttl(&self) -> Duration {
        Duration::from_secs(self.dead_letter_ttl_secs)
    }
}

impl EventsConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EventError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EventsConfig = toml::from_str(content)
            .map_err(|e| EventError::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.redis.url.is_empty() {
            return Err(EventError::Config("redis.url cannot be empty".to_string()));
        }
        if self.stores.history_ttl_secs == 0 || self.stores.dead_letter_ttl_secs == 0 {
            return Err(EventError::Config("store TTLs must be positive".to_string()));
        }
        self.delivery.to_options().validate()
    }
}
