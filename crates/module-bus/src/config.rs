//! Bus configuration from defaults or environment variables.

use std::env;
use std::str::FromStr;
use thiserror::Error;

use crate::HISTORY_CAPACITY;

/// Upper bound accepted for `history_capacity`.
pub const MAX_HISTORY_CAPACITY: usize = 100_000;

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("batch_size must be at least 1")]
    ZeroBatchSize,

    #[error("history_capacity must be at least 1")]
    ZeroHistoryCapacity,

    #[error("history_capacity {0} exceeds the maximum of {max}", max = MAX_HISTORY_CAPACITY)]
    HistoryCapacityTooLarge(usize),

    #[error("optimizer_interval_ms must be at least 1")]
    ZeroOptimizerInterval,

    #[error("error_rate_threshold {0} must be in (0, 1]")]
    ErrorRateOutOfRange(f64),
}

/// Tuning knobs of the scheduler, history and optimizer.
#[derive(Debug, Clone, PartialEq)]
pub struct BusConfig {
    /// Low-tier depth above which batch draining starts.
    pub low_queue_threshold: usize,

    /// Messages per low-tier batch.
    pub batch_size: usize,

    /// History entries kept per event.
    pub history_capacity: usize,

    /// Whether `start()` spawns the optimizer task.
    pub optimizer_enabled: bool,

    /// Period of the optimizer task.
    pub optimizer_interval_ms: u64,

    /// Global error rate above which retry policies are loosened.
    pub error_rate_threshold: f64,

    /// Global average latency above which the low tier is force-drained.
    pub latency_threshold_ms: f64,

    /// Upper bound for loosened backoff.
    pub max_backoff_ms: u64,

    /// Upper bound for loosened retry counts.
    pub max_retries_ceiling: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            low_queue_threshold: 10,
            batch_size: 5,
            history_capacity: HISTORY_CAPACITY,
            optimizer_enabled: true,
            optimizer_interval_ms: 5_000,
            error_rate_threshold: 0.10,
            latency_threshold_ms: 100.0,
            max_backoff_ms: 10_000,
            max_retries_ceiling: 10,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl BusConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BUS_LOW_QUEUE_THRESHOLD` (default: 10)
    /// - `BUS_BATCH_SIZE` (default: 5)
    /// - `BUS_HISTORY_CAPACITY` (default: 100)
    /// - `BUS_OPTIMIZER_ENABLED` (default: true)
    /// - `BUS_OPTIMIZER_INTERVAL_MS` (default: 5000)
    /// - `BUS_ERROR_RATE_THRESHOLD` (default: 0.10)
    /// - `BUS_LATENCY_THRESHOLD_MS` (default: 100)
    /// - `BUS_MAX_BACKOFF_MS` (default: 10000)
    /// - `BUS_MAX_RETRIES_CEILING` (default: 10)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            low_queue_threshold: env_or("BUS_LOW_QUEUE_THRESHOLD", defaults.low_queue_threshold),
            batch_size: env_or("BUS_BATCH_SIZE", defaults.batch_size),
            history_capacity: env_or("BUS_HISTORY_CAPACITY", defaults.history_capacity),
            optimizer_enabled: env::var("BUS_OPTIMIZER_ENABLED")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.optimizer_enabled),
            optimizer_interval_ms: env_or(
                "BUS_OPTIMIZER_INTERVAL_MS",
                defaults.optimizer_interval_ms,
            ),
            error_rate_threshold: env_or(
                "BUS_ERROR_RATE_THRESHOLD",
                defaults.error_rate_threshold,
            ),
            latency_threshold_ms: env_or(
                "BUS_LATENCY_THRESHOLD_MS",
                defaults.latency_threshold_ms,
            ),
            max_backoff_ms: env_or("BUS_MAX_BACKOFF_MS", defaults.max_backoff_ms),
            max_retries_ceiling: env_or("BUS_MAX_RETRIES_CEILING", defaults.max_retries_ceiling),
        }
    }

    /// Configuration without the periodic optimizer, for deterministic
    /// scheduling.
    #[must_use]
    pub fn without_optimizer() -> Self {
        Self {
            optimizer_enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroHistoryCapacity);
        }
        if self.history_capacity > MAX_HISTORY_CAPACITY {
            return Err(ConfigError::HistoryCapacityTooLarge(self.history_capacity));
        }
        if self.optimizer_interval_ms == 0 {
            return Err(ConfigError::ZeroOptimizerInterval);
        }
        if !(self.error_rate_threshold > 0.0 && self.error_rate_threshold <= 1.0) {
            return Err(ConfigError::ErrorRateOutOfRange(self.error_rate_threshold));
        }
        Ok(())
    }
}
