//! Alert evaluation.
//!
//! Decides, per price sample, whether an out-of-range notification is due.
//! At most one notification is sent per excursion: once `alerted` is set it
//! stays set until [`AlertState::reset`] is called (range reconfigured).
//! Price returning into range does not re-arm the alert.

use chrono::Utc;
use pricewatch_core::{format_price, PriceRange};

/// Relative price change at or below which a sample is ignored (0.01%).
pub const JITTER_THRESHOLD: f64 = 0.0001;

/// Which configured bound a price crossed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CrossedBound {
    /// Price at or below the minimum.
    Below(f64),
    /// Price at or above the maximum.
    Above(f64),
}

impl CrossedBound {
    /// Find the crossed bound, checking the minimum first.
    pub fn check(price: f64, range: &PriceRange) -> Option<Self> {
        if let Some(min) = range.min() {
            if price <= min {
                return Some(CrossedBound::Below(min));
            }
        }
        if let Some(max) = range.max() {
            if price >= max {
                return Some(CrossedBound::Above(max));
            }
        }
        None
    }
}

/// An out-of-range notification to deliver.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub symbol: String,
    pub price: f64,
    pub bound: CrossedBound,
}

impl Alert {
    /// Render the notification text.
    pub fn message(&self) -> String {
        let (label, bound, direction) = match self.bound {
            CrossedBound::Below(min) => ("📉 Min price", min, "Price fell below the configured minimum!"),
            CrossedBound::Above(max) => ("📈 Max price", max, "Price rose above the configured maximum!"),
        };

        format!(
            "🔔 ALERT! {}\n\
             💰 Current price: {}\n\
             {}: {}\n\
             📊 {}\n\n\
             ⏰ {}",
            self.symbol,
            format_price(self.price),
            label,
            format_price(bound),
            direction,
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

/// Outcome of evaluating one sample.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertDecision {
    /// First sample of this monitor: recorded as baseline, never alerts.
    Baseline,
    /// Change from the last observation is within the jitter threshold.
    Jitter,
    /// Price is inside the range.
    InRange,
    /// Price left the range and no alert was sent for this excursion yet.
    Notify(Alert),
    /// Price is still out of range, already notified.
    AlreadyAlerted,
}

/// Per-monitor alert tracking record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertState {
    /// An out-of-range notification was emitted for the current excursion.
    pub alerted: bool,
    /// Last price that passed the jitter filter.
    pub last_observed_price: Option<f64>,
    /// Whether this monitor has evaluated any sample yet.
    primed: bool,
}

impl AlertState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-arm after a range change.
    ///
    /// The next sample becomes the new baseline and is evaluated against the
    /// range straight away.
    pub fn reset(&mut self) {
        self.alerted = false;
        self.last_observed_price = None;
    }

    /// Evaluate a price sample, updating the state.
    pub fn evaluate(&mut self, symbol: &str, price: f64, range: &PriceRange) -> AlertDecision {
        match self.last_observed_price {
            None => {
                self.last_observed_price = Some(price);
                if !self.primed {
                    self.primed = true;
                    return AlertDecision::Baseline;
                }
            }
            Some(last) => {
                // Baseline stays put on tiny moves, so drift can accumulate.
                if ((price - last) / last).abs() <= JITTER_THRESHOLD {
                    return AlertDecision::Jitter;
                }
                self.last_observed_price = Some(price);
            }
        }

        match CrossedBound::check(price, range) {
            None => AlertDecision::InRange,
            Some(_) if self.alerted => AlertDecision::AlreadyAlerted,
            Some(bound) => {
                self.alerted = true;
                AlertDecision::Notify(Alert {
                    symbol: symbol.to_string(),
                    price,
                    bound,
                })
            }
        }
    }
}
