//! Engine configuration.

use crate::error::{EngineError, EngineResult};
use std::time::Duration;

/// Shortest accepted poll interval in seconds.
pub const MIN_POLL_INTERVAL_SECS: u64 = 10;
/// Longest accepted poll interval in seconds.
pub const MAX_POLL_INTERVAL_SECS: u64 = 3600;
/// Default poll interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Monitoring engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time between two fetches of the same monitor.
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

impl EngineConfig {
    /// Create a config from a poll interval in seconds, rejecting values
    /// outside the accepted bounds.
    pub fn from_secs(secs: u64) -> EngineResult<Self> {
        if !(MIN_POLL_INTERVAL_SECS..=MAX_POLL_INTERVAL_SECS).contains(&secs) {
            return Err(EngineError::PollIntervalOutOfRange(
                secs,
                MIN_POLL_INTERVAL_SECS,
                MAX_POLL_INTERVAL_SECS,
            ));
        }
        Ok(Self {
            poll_interval: Duration::from_secs(secs),
        })
    }
}
