//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if a value is present but malformed.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TICK_MS: u64 = 16;

#[derive(Debug, Clone)]
pub struct Config {
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Path to the spawn catalog TOML file.
    pub catalog_path: Option<PathBuf>,
    /// Interval between host ticks (each tick drains the dispatcher).
    pub tick_interval: Duration,
    /// Refuse to create an execution context, as a batch-mode host does.
    pub headless: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            otel_endpoint: None,
            log_level: "info".to_string(),
            catalog_path: None,
            tick_interval: Duration::from_millis(DEFAULT_TICK_MS),
            headless: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let tick_ms = match std::env::var("MODHELPER_TICK_MS") {
            Ok(raw) => parse_tick_ms(&raw)?,
            Err(_) => DEFAULT_TICK_MS,
        };

        let headless = match std::env::var("MODHELPER_HEADLESS") {
            Ok(raw) => parse_bool("MODHELPER_HEADLESS", &raw)?,
            Err(_) => false,
        };

        Ok(Self {
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            catalog_path: std::env::var("MODHELPER_CATALOG").ok().map(PathBuf::from),
            tick_interval: Duration::from_millis(tick_ms),
            headless,
        })
    }
}

fn parse_tick_ms(raw: &str) -> Result<u64> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(Error::Config("MODHELPER_TICK_MS must be positive".to_string())),
        Ok(ms) => Ok(ms),
        Err(e) => Err(Error::Config(format!(
            "MODHELPER_TICK_MS is not a valid integer ({raw:?}): {e}"
        ))),
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::Config(format!("{name} is not a boolean: {other:?}"))),
    }
}
