//! Runtime configuration validation.
//!
//! Checks every key the host reads before a task is started and collects the
//! results into [`RuntimeSettings`].

use std::path::PathBuf;

use crate::domain::error::CanvasError;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_TICK_INTERVAL_MS: i64 = 100;
pub const DEFAULT_MAX_TICKS: i64 = 1_000;
pub const DEFAULT_POLL_INTERVAL_MS: i64 = 500;
pub const DEFAULT_FILL_DELAY: i64 = 1;
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    pub account: String,
    pub tick_interval_ms: u64,
    pub max_ticks: u64,
    pub poll_interval_ms: u64,
    /// Report polls before a simulated order fills.
    pub fill_delay: u32,
    /// Simulated orders above this quantity are rejected.
    pub reject_above_quantity: Option<i64>,
    pub market_data_directory: Option<PathBuf>,
    pub log_filter: String,
}

pub fn validate_runtime_config(config: &dyn ConfigPort) -> Result<RuntimeSettings, CanvasError> {
    let account = validate_account(config)?;
    let tick_interval_ms = non_negative(config, "task", "tick_interval_ms", DEFAULT_TICK_INTERVAL_MS)?;
    let max_ticks = positive(config, "task", "max_ticks", DEFAULT_MAX_TICKS)?;
    let poll_interval_ms = positive(config, "observer", "poll_interval_ms", DEFAULT_POLL_INTERVAL_MS)?;
    let fill_delay = non_negative(config, "simulation", "fill_delay", DEFAULT_FILL_DELAY)?;
    let fill_delay = u32::try_from(fill_delay).map_err(|_| CanvasError::ConfigInvalid {
        section: "simulation".to_string(),
        key: "fill_delay".to_string(),
        reason: "fill_delay is too large".to_string(),
    })?;
    let reject_above_quantity = validate_reject_above(config)?;
    let market_data_directory = validate_market_data_directory(config)?;
    let log_filter = config
        .get_string("logging", "filter")
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    Ok(RuntimeSettings {
        account,
        tick_interval_ms,
        max_ticks,
        poll_interval_ms,
        fill_delay,
        reject_above_quantity,
        market_data_directory,
        log_filter,
    })
}

fn validate_account(config: &dyn ConfigPort) -> Result<String, CanvasError> {
    match config.get_string("task", "account") {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(CanvasError::ConfigMissing {
            section: "task".to_string(),
            key: "account".to_string(),
        }),
    }
}

fn non_negative(config: &dyn ConfigPort, section: &str, key: &str, default: i64) -> Result<u64, CanvasError> {
    let value = config.get_int(section, key, default);
    u64::try_from(value).map_err(|_| CanvasError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: format!("{key} must be non-negative"),
    })
}

fn positive(config: &dyn ConfigPort, section: &str, key: &str, default: i64) -> Result<u64, CanvasError> {
    let value = config.get_int(section, key, default);
    if value <= 0 {
        return Err(CanvasError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("{key} must be positive"),
        });
    }
    Ok(value as u64)
}

fn validate_reject_above(config: &dyn ConfigPort) -> Result<Option<i64>, CanvasError> {
    let value = config.get_int("simulation", "reject_above_quantity", 0);
    if value < 0 {
        return Err(CanvasError::ConfigInvalid {
            section: "simulation".to_string(),
            key: "reject_above_quantity".to_string(),
            reason: "reject_above_quantity must be non-negative, 0 disables it".to_string(),
        });
    }
    Ok((value > 0).then_some(value))
}

fn validate_market_data_directory(config: &dyn ConfigPort) -> Result<Option<PathBuf>, CanvasError> {
    let Some(directory) = config.get_string("market_data", "directory") else {
        return Ok(None);
    };
    let path = PathBuf::from(directory.trim());
    if !path.is_dir() {
        return Err(CanvasError::ConfigInvalid {
            section: "market_data".to_string(),
            key: "directory".to_string(),
            reason: format!("{} is not a directory", path.display()),
        });
    }
    Ok(Some(path))
}
