//! Error types for core data validation.

use thiserror::Error;

/// Errors raised while validating user supplied pair data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("Invalid number format: {0}")]
    InvalidNumber(String),

    #[error("Price must be a positive number, got {0}")]
    NonPositivePrice(f64),

    #[error("Invalid range: min {min} must be below max {max}")]
    InvalidRange { min: f64, max: f64 },

    #[error("Unsupported pair: {base}/{quote}")]
    UnsupportedPair { base: String, quote: String },
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
