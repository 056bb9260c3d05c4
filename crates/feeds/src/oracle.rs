//! Price oracle seam.

use crate::error::FeedError;
use async_trait::async_trait;

/// Async source of market prices.
///
/// Implementations apply their own retry policy. A failure is an expected
/// outcome, not something callers need to recover from beyond retrying later.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Fetch the current price of `base` expressed in `quote`.
    async fn fetch(&self, base: &str, quote: &str) -> Result<f64, FeedError>;
}

/// Reject zero, negative and non-finite prices.
pub(crate) fn positive_price(price: f64) -> Result<f64, FeedError> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(FeedError::InvalidPrice(price))
    }
}
