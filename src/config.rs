//! Runtime settings, read from the environment once at startup

use std::path::PathBuf;

use crate::model::{MAX_LOOKBACK_DAYS, MIN_LOOKBACK_DAYS};
use crate::view::TableMode;

pub const DEFAULT_DB_FILE: &str = "stocks.db";
pub const DEFAULT_LOOKBACK_DAYS: u32 = 30;

/// Whether the clock label is set once or kept ticking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockMode {
    #[default]
    OneShot,
    Ticking,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub table_mode: TableMode,
    pub clock_mode: ClockMode,
    pub log_dir: PathBuf,
    pub lookback_days: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_FILE),
            table_mode: TableMode::default(),
            clock_mode: ClockMode::default(),
            log_dir: default_log_dir(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }
}

fn default_log_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("stock-explorer")
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unknown or malformed values fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(path) = lookup("STOCK_EXPLORER_DB").filter(|v| !v.trim().is_empty()) {
            config.db_path = PathBuf::from(path.trim());
        }

        if let Some(mode) = lookup("STOCK_EXPLORER_TABLE") {
            config.table_mode = match mode.trim().to_ascii_lowercase().as_str() {
                "page" | "paged" => TableMode::Paged,
                _ => TableMode::Scrollable,
            };
        }

        if let Some(mode) = lookup("STOCK_EXPLORER_CLOCK") {
            config.clock_mode = match mode.trim().to_ascii_lowercase().as_str() {
                "tick" | "ticking" | "live" => ClockMode::Ticking,
                _ => ClockMode::OneShot,
            };
        }

        if let Some(dir) = lookup("STOCK_EXPLORER_LOG_DIR").filter(|v| !v.trim().is_empty()) {
            config.log_dir = PathBuf::from(dir.trim());
        }

        if let Some(days) = lookup("STOCK_EXPLORER_PERIOD").and_then(|v| v.trim().parse::<u32>().ok()) {
            config.lookback_days = days.clamp(MIN_LOOKBACK_DAYS, MAX_LOOKBACK_DAYS);
        }

        config
    }
}
