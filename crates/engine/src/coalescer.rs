//! Request coalescing.
//!
//! Concurrent `resolve` calls for the same symbol share one oracle fetch.
//! Nothing is cached once that fetch completes.

use crate::lock;
use pricewatch_core::symbol;
use pricewatch_feeds::{FeedError, PriceOracle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::debug;

type Outcome = Result<f64, FeedError>;
type InFlightMap = Arc<Mutex<HashMap<String, watch::Receiver<Option<Outcome>>>>>;

/// Removes the in-flight registration when dropped, whatever the outcome.
struct InFlightGuard {
    in_flight: InFlightMap,
    symbol: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.symbol);
    }
}

/// Deduplicates concurrent oracle calls per symbol.
#[derive(Clone)]
pub struct RequestCoalescer {
    oracle: Arc<dyn PriceOracle>,
    in_flight: InFlightMap,
}

impl RequestCoalescer {
    pub fn new(oracle: Arc<dyn PriceOracle>) -> Self {
        Self {
            oracle,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Resolve the price of `base`/`quote`, joining a fetch already in flight.
    ///
    /// The fetch runs on its own task: dropping this future, even as the
    /// caller that started the fetch, does not cancel it for other waiters.
    pub async fn resolve(&self, base: &str, quote: &str) -> Outcome {
        let symbol = symbol(base, quote);

        let mut rx = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(&symbol) {
                Some(rx) => {
                    debug!(symbol = %symbol, "Joining in-flight price request");
                    rx.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(symbol.clone(), rx.clone());
                    self.spawn_fetch(symbol, base.to_uppercase(), quote.to_uppercase(), tx);
                    rx
                }
            }
        };

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Err(FeedError::Abandoned)),
            // Producer dropped without publishing (oracle panicked)
            Err(_) => Err(FeedError::Abandoned),
        };
        outcome
    }

    fn spawn_fetch(
        &self,
        symbol: String,
        base: String,
        quote: String,
        tx: watch::Sender<Option<Outcome>>,
    ) {
        let oracle = Arc::clone(&self.oracle);
        let guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            symbol,
        };

        tokio::spawn(async move {
            let outcome = oracle.fetch(&base, &quote).await;
            // Deregister before publishing so late callers start a fresh fetch.
            drop(guard);
            let _ = tx.send(Some(outcome));
        });
    }

    /// Number of symbols with a fetch currently in flight.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }
}
