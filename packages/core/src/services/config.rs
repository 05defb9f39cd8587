//! Configuration for the tree mutation engine
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default broadcast capacity for tree events
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 128;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid engine configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse engine configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Engine tuning knobs
///
/// Every field has a default, so a partial JSON document is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum wait for a collection's mutation lock, in milliseconds
    pub lock_timeout_ms: u64,

    /// Rebuild dense sequences after a write phase fails for a non-conflict reason
    pub repair_on_write_failure: bool,

    /// Capacity of the tree event broadcast channel
    pub event_channel_capacity: usize,

    /// Retries performed by `ConflictRetryQueue` after the first attempt
    pub max_conflict_retries: usize,

    /// First retry backoff in milliseconds; doubles on each attempt
    pub retry_base_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5000,
            repair_on_write_failure: true,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            max_conflict_retries: 3,
            retry_base_backoff_ms: 10,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "lock_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_channel_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Backoff before retry number `attempt` (0-based): base * 2^attempt
    pub fn retry_backoff(&self, attempt: usize) -> Duration {
        let factor = 1u64.checked_shl(attempt as u32).unwrap_or(u64::MAX);
        Duration::from_millis(self.retry_base_backoff_ms.saturating_mul(factor))
    }
}
