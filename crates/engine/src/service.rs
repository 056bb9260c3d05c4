//! Monitoring facade used by the chat front-end.
//!
//! Keeps the tracked-pair book and the monitor registry consistent: a pair
//! is monitored exactly while it is tracked.

use crate::book::PairBook;
use crate::coalescer::RequestCoalescer;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::registry::MonitorRegistry;
use crate::notifier::Notifier;
use pricewatch_core::{symbol, validate_pair, OwnerId, PriceRange, TrackedPair};
use pricewatch_feeds::{FeedError, PriceOracle};
use std::sync::Arc;
use tracing::info;

/// Last known price of a monitored pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceStatus {
    Ready(f64),
    /// No successful fetch yet.
    Pending,
}

/// Tracked pairs plus the monitors watching them.
#[derive(Clone)]
pub struct MonitorService {
    book: PairBook,
    registry: MonitorRegistry,
    coalescer: RequestCoalescer,
    notifier: Arc<dyn Notifier>,
}

impl MonitorService {
    pub fn new(
        config: EngineConfig,
        oracle: Arc<dyn PriceOracle>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let book = PairBook::new();
        let coalescer = RequestCoalescer::new(oracle);
        let registry = MonitorRegistry::new(config, coalescer.clone(), Arc::new(book.clone()));

        Self {
            book,
            registry,
            coalescer,
            notifier,
        }
    }

    /// Track a new pair and start monitoring it.
    pub fn track_pair(&self, owner: OwnerId, base: &str, quote: &str) -> EngineResult<TrackedPair> {
        validate_pair(base, quote)?;

        let pair = TrackedPair::new(owner, base, quote);
        self.book.add(pair.clone())?;
        self.start_monitoring(owner, &pair.base, &pair.quote);

        info!(owner, symbol = %pair.symbol(), "Pair tracked");
        Ok(pair)
    }

    /// Stop monitoring a pair and forget it.
    pub fn untrack_pair(&self, owner: OwnerId, base: &str, quote: &str) -> EngineResult<TrackedPair> {
        let pair = self
            .book
            .remove(owner, base, quote)
            .ok_or_else(|| EngineError::PairNotFound {
                owner,
                symbol: symbol(base, quote),
            })?;
        self.stop_monitoring(owner, base, quote);

        info!(owner, symbol = %pair.symbol(), "Pair untracked");
        Ok(pair)
    }

    /// Replace a pair's range and re-arm its alert.
    pub fn set_range(
        &self,
        owner: OwnerId,
        base: &str,
        quote: &str,
        range: PriceRange,
    ) -> EngineResult<TrackedPair> {
        let pair = self.book.set_range(owner, base, quote, range)?;
        self.on_range_changed(owner, base, quote);

        info!(owner, symbol = %pair.symbol(), range = %pair.range, "Range updated");
        Ok(pair)
    }

    pub fn start_monitoring(&self, owner: OwnerId, base: &str, quote: &str) -> bool {
        self.registry
            .start(owner, base, quote, Arc::clone(&self.notifier))
    }

    pub fn stop_monitoring(&self, owner: OwnerId, base: &str, quote: &str) -> bool {
        self.registry.stop(owner, base, quote)
    }

    pub fn get_last_price(&self, owner: OwnerId, base: &str, quote: &str) -> PriceStatus {
        match self.registry.last_price(owner, base, quote) {
            Some(price) => PriceStatus::Ready(price),
            None => PriceStatus::Pending,
        }
    }

    /// Re-arm alerts after a range change made elsewhere.
    pub fn on_range_changed(&self, owner: OwnerId, base: &str, quote: &str) {
        self.registry.reset_alert(owner, base, quote);
    }

    /// Load persisted pairs and start a monitor for each. Returns the number restored.
    pub fn restore(&self, pairs: Vec<TrackedPair>) -> usize {
        let mut restored = 0;
        for pair in pairs {
            let (owner, base, quote) = (pair.owner, pair.base.clone(), pair.quote.clone());
            if self.book.add(pair).is_ok() {
                self.start_monitoring(owner, &base, &quote);
                restored += 1;
            }
        }
        info!(restored, "Tracked pairs restored");
        restored
    }

    /// One-shot live quote, shared with any monitor fetching the same symbol.
    pub async fn quote(&self, base: &str, quote: &str) -> Result<f64, FeedError> {
        self.coalescer.resolve(base, quote).await
    }

    pub fn pairs_for(&self, owner: OwnerId) -> Vec<TrackedPair> {
        self.book.pairs_for(owner)
    }

    pub fn book(&self) -> &PairBook {
        &self.book
    }

    pub fn registry(&self) -> &MonitorRegistry {
        &self.registry
    }

    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::RecordingNotifier;
    use pretty_assertions::assert_eq;
    use pricewatch_core::{CoreError, MonitorKey};
    use pricewatch_feeds::MockOracle;
    use std::time::Duration;

    fn service() -> (Arc<MockOracle>, Arc<RecordingNotifier>, MonitorService) {
        let oracle = Arc::new(MockOracle::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let service = MonitorService::new(EngineConfig::default(), oracle.clone(), notifier.clone());
        (oracle, notifier, service)
    }

    async fn settle(duration: Duration) {
        tokio::time::sleep(duration).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_starts_monitor() {
        let (oracle, _, service) = service();
        oracle.push_price("BTC", "USDT", 65000.0);

        let pair = service.track_pair(7, "btc", "usdt").unwrap();
        assert_eq!(pair.symbol(), "BTCUSDT");
        assert_eq!(service.get_last_price(7, "BTC", "USDT"), PriceStatus::Pending);

        settle(Duration::from_secs(1)).await;
        assert_eq!(service.get_last_price(7, "BTC", "USDT"), PriceStatus::Ready(65000.0));
        assert!(service.registry().is_running(&MonitorKey::new(7, "BTC", "USDT")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_rejects_duplicates_and_unknown_assets() {
        let (_, _, service) = service();
        service.track_pair(1, "ETH", "USDT").unwrap();

        assert!(matches!(
            service.track_pair(1, "ETH", "USDT"),
            Err(EngineError::DuplicatePair { .. })
        ));
        assert!(matches!(
            service.track_pair(1, "NOPE", "USDT"),
            Err(EngineError::Invalid(CoreError::UnsupportedPair { .. }))
        ));
        assert_eq!(service.registry().active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_untrack_stops_monitor() {
        let (oracle, _, service) = service();
        oracle.push_price("SOL", "USDT", 150.0);
        service.track_pair(1, "SOL", "USDT").unwrap();
        settle(Duration::from_secs(1)).await;

        service.untrack_pair(1, "SOL", "USDT").unwrap();
        assert_eq!(service.registry().active_count(), 0);
        assert_eq!(service.get_last_price(1, "SOL", "USDT"), PriceStatus::Pending);
        assert!(service.pairs_for(1).is_empty());

        assert_eq!(
            service.untrack_pair(1, "SOL", "USDT"),
            Err(EngineError::PairNotFound {
                owner: 1,
                symbol: "SOLUSDT".to_string()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_range_takes_effect_and_rearms() {
        let (oracle, notifier, service) = service();
        for price in [150.0, 95.0, 94.0, 93.0] {
            oracle.push_price("BTC", "USDT", price);
        }
        service.track_pair(1, "BTC", "USDT").unwrap();
        service
            .set_range(1, "BTC", "USDT", PriceRange::new(Some(100.0), None).unwrap())
            .unwrap();

        settle(Duration::from_secs(121)).await;
        assert_eq!(notifier.messages().len(), 1);

        // Same range again still counts as a reconfiguration
        service
            .set_range(1, "BTC", "USDT", PriceRange::new(Some(100.0), None).unwrap())
            .unwrap();
        settle(Duration::from_secs(60)).await;
        assert_eq!(notifier.messages().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_starts_each_pair_once() {
        let (_, _, service) = service();
        let pairs = vec![
            TrackedPair::new(1, "BTC", "USDT"),
            TrackedPair::new(1, "BTC", "USDT"),
            TrackedPair::new(2, "ETH", "BTC"),
        ];

        assert_eq!(service.restore(pairs), 2);
        assert_eq!(service.registry().active_count(), 2);
        assert_eq!(service.book().len(), 2);

        service.shutdown().await;
        assert_eq!(service.registry().active_count(), 0);
    }

    #[tokio::test]
    async fn test_quote_goes_through_oracle() {
        let (oracle, _, service) = service();
        oracle.push_price("ETH", "BTC", 0.05);

        assert_eq!(service.quote("eth", "btc").await, Ok(0.05));
        assert_eq!(
            service.quote("XRP", "USDT").await,
            Err(FeedError::SymbolNotFound("XRPUSDT".to_string()))
        );
    }
}
