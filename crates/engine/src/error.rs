//! Error types for engine operations.

use pricewatch_core::{CoreError, OwnerId};
use thiserror::Error;

/// Errors returned by the tracked-pair book and the monitor service.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Pair {symbol} is already tracked for {owner}")]
    DuplicatePair { owner: OwnerId, symbol: String },

    #[error("Pair {symbol} is not tracked for {owner}")]
    PairNotFound { owner: OwnerId, symbol: String },

    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error("Poll interval {0}s is outside {1}..={2}s")]
    PollIntervalOutOfRange(u64, u64, u64),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
