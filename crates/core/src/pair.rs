//! Tracked pair definitions.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chat/user identifier that owns tracked pairs.
pub type OwnerId = i64;

/// Canonical symbol for a base/quote pair (e.g., "BTCUSDT").
pub fn symbol(base: &str, quote: &str) -> String {
    format!("{}{}", base, quote).to_uppercase()
}

/// Optional price bounds for a tracked pair.
///
/// An unset side means "no bound on that side". When both sides are set,
/// `min < max` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    min: Option<f64>,
    max: Option<f64>,
}

impl PriceRange {
    /// Range with no bounds.
    pub const UNBOUNDED: PriceRange = PriceRange {
        min: None,
        max: None,
    };

    /// Create a validated range.
    pub fn new(min: Option<f64>, max: Option<f64>) -> CoreResult<Self> {
        for bound in [min, max].into_iter().flatten() {
            if !bound.is_finite() || bound <= 0.0 {
                return Err(CoreError::NonPositivePrice(bound));
            }
        }
        if let (Some(min), Some(max)) = (min, max) {
            if min >= max {
                return Err(CoreError::InvalidRange { min, max });
            }
        }
        Ok(Self { min, max })
    }

    #[inline]
    pub fn min(&self) -> Option<f64> {
        self.min
    }

    #[inline]
    pub fn max(&self) -> Option<f64> {
        self.max
    }

    /// True if at least one bound is set.
    pub fn is_configured(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }
}

impl fmt::Display for PriceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (None, None) => write!(f, "not set"),
            (Some(min), None) => write!(f, "from {:.8}", min),
            (None, Some(max)) => write!(f, "up to {:.8}", max),
            (Some(min), Some(max)) => write!(f, "{:.8} - {:.8}", min, max),
        }
    }
}

/// A base/quote pair watched on behalf of one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedPair {
    pub owner: OwnerId,
    /// Base asset code, uppercase (e.g., "BTC")
    pub base: String,
    /// Quote asset code, uppercase (e.g., "USDT")
    pub quote: String,
    pub range: PriceRange,
    pub created_at: DateTime<Utc>,
}

impl TrackedPair {
    /// Create an unbounded pair created now.
    pub fn new(owner: OwnerId, base: &str, quote: &str) -> Self {
        Self {
            owner,
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
            range: PriceRange::UNBOUNDED,
            created_at: Utc::now(),
        }
    }

    /// Builder-style range setter.
    pub fn with_range(mut self, range: PriceRange) -> Self {
        self.range = range;
        self
    }

    pub fn symbol(&self) -> String {
        symbol(&self.base, &self.quote)
    }

    pub fn key(&self) -> MonitorKey {
        MonitorKey::new(self.owner, &self.base, &self.quote)
    }

    /// True if this pair is the same base/quote, ignoring case.
    pub fn matches(&self, base: &str, quote: &str) -> bool {
        self.base.eq_ignore_ascii_case(base) && self.quote.eq_ignore_ascii_case(quote)
    }
}

/// Identifies one monitor task and its alert-tracking record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitorKey {
    pub owner: OwnerId,
    pub symbol: String,
}

impl MonitorKey {
    pub fn new(owner: OwnerId, base: &str, quote: &str) -> Self {
        Self {
            owner,
            symbol: symbol(base, quote),
        }
    }
}

impl fmt::Display for MonitorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner, self.symbol)
    }
}
