//! Live tracked-pair configuration.
//!
//! Monitors read pair configuration from here on every poll, so range edits
//! take effect without restarting them.

use crate::error::{EngineError, EngineResult};
use dashmap::DashMap;
use pricewatch_core::{symbol, OwnerId, PriceRange, TrackedPair};
use std::sync::Arc;

/// Read access to the current configuration of a tracked pair.
pub trait PairLookup: Send + Sync {
    fn find(&self, owner: OwnerId, base: &str, quote: &str) -> Option<TrackedPair>;
}

/// In-memory store of every owner's tracked pairs.
#[derive(Debug, Clone, Default)]
pub struct PairBook {
    pairs: Arc<DashMap<OwnerId, Vec<TrackedPair>>>,
}

impl PairBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pair. A base/quote combination may be tracked once per owner.
    pub fn add(&self, pair: TrackedPair) -> EngineResult<()> {
        let mut owned = self.pairs.entry(pair.owner).or_default();
        if owned.iter().any(|p| p.matches(&pair.base, &pair.quote)) {
            return Err(EngineError::DuplicatePair {
                owner: pair.owner,
                symbol: pair.symbol(),
            });
        }
        owned.push(pair);
        Ok(())
    }

    /// Remove a pair, returning it if it was tracked.
    pub fn remove(&self, owner: OwnerId, base: &str, quote: &str) -> Option<TrackedPair> {
        let mut owned = self.pairs.get_mut(&owner)?;
        let idx = owned.iter().position(|p| p.matches(base, quote))?;
        Some(owned.remove(idx))
    }

    /// Replace the range of a tracked pair.
    pub fn set_range(
        &self,
        owner: OwnerId,
        base: &str,
        quote: &str,
        range: PriceRange,
    ) -> EngineResult<TrackedPair> {
        let not_found = || EngineError::PairNotFound {
            owner,
            symbol: symbol(base, quote),
        };

        let mut owned = self.pairs.get_mut(&owner).ok_or_else(not_found)?;
        let pair = owned
            .iter_mut()
            .find(|p| p.matches(base, quote))
            .ok_or_else(not_found)?;
        pair.range = range;
        Ok(pair.clone())
    }

    /// Pairs of one owner, in insertion order.
    pub fn pairs_for(&self, owner: OwnerId) -> Vec<TrackedPair> {
        self.pairs
            .get(&owner)
            .map(|owned| owned.value().clone())
            .unwrap_or_default()
    }

    /// Bulk insert, skipping duplicates. Returns the number added.
    pub fn load(&self, pairs: impl IntoIterator<Item = TrackedPair>) -> usize {
        pairs
            .into_iter()
            .filter(|pair| self.add(pair.clone()).is_ok())
            .count()
    }

    pub fn len(&self) -> usize {
        self.pairs.iter().map(|owned| owned.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PairLookup for PairBook {
    fn find(&self, owner: OwnerId, base: &str, quote: &str) -> Option<TrackedPair> {
        self.pairs
            .get(&owner)?
            .iter()
            .find(|p| p.matches(base, quote))
            .cloned()
    }
}
