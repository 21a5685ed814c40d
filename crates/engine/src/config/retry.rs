//! Step retry configuration.

use serde::{Deserialize, Serialize};

/// Retry configuration for transient step failures.
///
/// Environment variables are prefixed with `TXFLOW_RETRY_`:
/// - `TXFLOW_RETRY_MAX_ATTEMPTS`: Attempts per step, first try included (default: 5)
/// - `TXFLOW_RETRY_INITIAL_DELAY_MS`: Delay before the second attempt (default: 50)
/// - `TXFLOW_RETRY_MAX_DELAY_MS`: Upper bound on any delay (default: 5000)
/// - `TXFLOW_RETRY_BACKOFF_MULTIPLIER`: Growth factor per attempt (default: 2.0)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    50
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl RetryConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("TXFLOW_RETRY_").from_env::<RetryConfig>()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}
