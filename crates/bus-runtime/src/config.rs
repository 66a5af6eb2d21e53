//! Runtime configuration from environment variables.

use module_bus::BusConfig;
use std::env;

/// Configuration of the runtime binary.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Bus tuning (`BUS_*` variables).
    pub bus: BusConfig,

    /// Log filter directive (trace, debug, info, warn, error or a full
    /// `EnvFilter` directive)
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Stop after this many milliseconds instead of waiting for Ctrl+C
    pub run_for_ms: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            log_level: "info".to_string(),
            json_logs: false,
            run_for_ms: None,
        }
    }
}

impl RuntimeConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `BUS_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `BUS_JSON_LOGS`: Enable JSON logs (default: false)
    /// - `BUS_RUN_FOR_MS`: Exit after this duration (default: run until Ctrl+C)
    /// - every `BUS_*` variable read by `BusConfig::from_env`
    pub fn from_env() -> Self {
        Self {
            bus: BusConfig::from_env(),

            log_level: env::var("BUS_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            json_logs: env::var("BUS_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),

            run_for_ms: env::var("BUS_RUN_FOR_MS")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }
}
