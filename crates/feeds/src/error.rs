//! Error types for price fetching.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while fetching a price.
///
/// `Clone` so one coalesced outcome can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedError {
    #[error("Request failed: {0}")]
    ConnectionFailed(String),

    #[error("Unexpected HTTP status: {0}")]
    HttpStatus(u16),

    #[error("Symbol not listed: {0}")]
    SymbolNotFound(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(f64),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Price request abandoned")]
    Abandoned,
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout(err.to_string())
        } else if err.is_decode() {
            FeedError::ParseError(err.to_string())
        } else {
            FeedError::ConnectionFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::ParseError(err.to_string())
    }
}

impl FeedError {
    /// Returns true if this error is transient and likely to succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FeedError::ConnectionFailed(_) | FeedError::Timeout(_) | FeedError::HttpStatus(_)
        )
    }

    /// Returns a suggested retry delay for this error type, if applicable.
    /// Returns None for errors that should not be retried.
    pub fn suggested_retry_delay(&self, base: Duration) -> Option<Duration> {
        match self {
            FeedError::HttpStatus(429) => Some(base * 4),
            FeedError::ConnectionFailed(_) | FeedError::Timeout(_) | FeedError::HttpStatus(_) => {
                Some(base)
            }
            FeedError::SymbolNotFound(_)
            | FeedError::ParseError(_)
            | FeedError::InvalidPrice(_)
            | FeedError::Abandoned => None,
        }
    }
}
