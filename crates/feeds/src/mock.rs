//! Scripted oracle for tests.

use crate::error::FeedError;
use crate::oracle::PriceOracle;
use async_trait::async_trait;
use pricewatch_core::symbol;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Oracle that replays queued outcomes per symbol.
///
/// Once a symbol's queue runs dry the last outcome keeps being returned.
/// Symbols with no script fail with `SymbolNotFound`.
#[derive(Default)]
pub struct MockOracle {
    scripts: Mutex<HashMap<String, VecDeque<Result<f64, FeedError>>>>,
    last: Mutex<HashMap<String, Result<f64, FeedError>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate network latency on every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a price for a pair.
    pub fn push_price(&self, base: &str, quote: &str, price: f64) {
        self.push(base, quote, Ok(price));
    }

    /// Queue a failure for a pair.
    pub fn push_failure(&self, base: &str, quote: &str, error: FeedError) {
        self.push(base, quote, Err(error));
    }

    fn push(&self, base: &str, quote: &str, outcome: Result<f64, FeedError>) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.entry(symbol(base, quote)).or_default().push_back(outcome);
        }
    }

    /// Total number of fetches served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self, symbol: &str) -> Result<f64, FeedError> {
        let queued = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut scripts| scripts.get_mut(symbol).and_then(|q| q.pop_front()));

        let Ok(mut last) = self.last.lock() else {
            return Err(FeedError::Abandoned);
        };
        match queued {
            Some(outcome) => {
                last.insert(symbol.to_string(), outcome.clone());
                outcome
            }
            None => last
                .get(symbol)
                .cloned()
                .unwrap_or_else(|| Err(FeedError::SymbolNotFound(symbol.to_string()))),
        }
    }
}

#[async_trait]
impl PriceOracle for MockOracle {
    async fn fetch(&self, base: &str, quote: &str) -> Result<f64, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_outcome(&symbol(base, quote))
    }
}
