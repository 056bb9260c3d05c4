//! Application configuration.
//!
//! Values come from the environment (after `.env` is loaded) and may be
//! overridden by command-line flags.

use pricewatch_engine::{
    EngineConfig, DEFAULT_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS, MIN_POLL_INTERVAL_SECS,
};
use pricewatch_feeds::OracleConfig;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_RATE_LIMIT: usize = 60;
pub const DEFAULT_DATABASE_URL: &str = "sqlite://pricewatch.db";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("TELEGRAM_BOT_TOKEN is not set")]
    MissingToken,
    #[error("Invalid value for {name}: {value}")]
    InvalidNumber { name: &'static str, value: String },
}

/// Application settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub telegram_token: String,
    /// Seconds between two fetches of the same pair.
    pub update_interval: u64,
    /// Commands per chat per minute.
    pub rate_limit: usize,
    pub database_url: String,
    pub binance_base_url: Option<String>,
    pub log_level: String,
    /// Out-of-range interval that was replaced by the default.
    pub rejected_interval: Option<u64>,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `get`, which maps variable names to values.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let telegram_token = get("TELEGRAM_BOT_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .ok_or(ConfigError::MissingToken)?;

        let (update_interval, rejected_interval) = match get("UPDATE_INTERVAL") {
            Some(raw) => bounded_interval(parse_number("UPDATE_INTERVAL", &raw)?),
            None => (DEFAULT_POLL_INTERVAL_SECS, None),
        };

        let rate_limit = match get("RATE_LIMIT") {
            Some(raw) => parse_number("RATE_LIMIT", &raw)?,
            None => DEFAULT_RATE_LIMIT,
        };

        Ok(Self {
            telegram_token,
            update_interval,
            rate_limit,
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            binance_base_url: get("BINANCE_BASE_URL"),
            log_level: get("LOG_LEVEL")
                .map(|level| level.to_lowercase())
                .unwrap_or_else(|| "info".to_string()),
            rejected_interval,
        })
    }

    /// Replace the poll interval, applying the same bounds as the environment.
    pub fn set_update_interval(&mut self, secs: u64) {
        (self.update_interval, self.rejected_interval) = bounded_interval(secs);
    }

    /// Report settings that were adjusted while loading. Call once logging is up.
    pub fn log_adjustments(&self) {
        if let Some(secs) = self.rejected_interval {
            warn!(
                secs,
                min = MIN_POLL_INTERVAL_SECS,
                max = MAX_POLL_INTERVAL_SECS,
                default = DEFAULT_POLL_INTERVAL_SECS,
                "UPDATE_INTERVAL out of range, using default"
            );
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::from_secs(self.update_interval).unwrap_or_default()
    }

    pub fn oracle_config(&self) -> OracleConfig {
        let mut config = OracleConfig::default();
        if let Some(url) = &self.binance_base_url {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        config
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        name,
        value: raw.to_string(),
    })
}

/// Out-of-range intervals fall back to the default and are returned as rejected.
fn bounded_interval(secs: u64) -> (u64, Option<u64>) {
    if (MIN_POLL_INTERVAL_SECS..=MAX_POLL_INTERVAL_SECS).contains(&secs) {
        (secs, None)
    } else {
        (DEFAULT_POLL_INTERVAL_SECS, Some(secs))
    }
}
