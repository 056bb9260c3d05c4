//! Registry of running monitors.
//!
//! Exactly one monitor task exists per (owner, symbol). Start is idempotent,
//! stop discards the monitor's alert state, and a monitor whose pair was
//! deleted removes itself.

use crate::book::PairLookup;
use crate::coalescer::RequestCoalescer;
use crate::config::EngineConfig;
use crate::evaluator::AlertState;
use crate::lock;
use crate::monitor::{run_monitor, CachedPrice, MonitorContext, MonitorExit};
use crate::notifier::Notifier;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use pricewatch_core::{MonitorKey, OwnerId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Registry record of one running monitor.
struct MonitorEntry {
    /// Distinguishes a restarted monitor from its predecessor.
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    alert_state: Arc<Mutex<AlertState>>,
    last_check: Arc<Mutex<Option<Instant>>>,
}

struct RegistryInner {
    config: EngineConfig,
    coalescer: RequestCoalescer,
    pairs: Arc<dyn PairLookup>,
    tasks: DashMap<MonitorKey, MonitorEntry>,
    prices: Arc<DashMap<MonitorKey, CachedPrice>>,
    next_generation: AtomicU64,
}

impl RegistryInner {
    /// Drop a monitor that exited on its own, unless it was already replaced.
    fn retire(&self, key: &MonitorKey, generation: u64) {
        if self
            .tasks
            .remove_if(key, |_, entry| entry.generation == generation)
            .is_some()
        {
            self.prices.remove(key);
            info!(key = %key, "Monitor retired");
        }
    }
}

/// Process-wide table of monitor tasks keyed by (owner, symbol).
#[derive(Clone)]
pub struct MonitorRegistry {
    inner: Arc<RegistryInner>,
}

impl MonitorRegistry {
    pub fn new(
        config: EngineConfig,
        coalescer: RequestCoalescer,
        pairs: Arc<dyn PairLookup>,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                coalescer,
                pairs,
                tasks: DashMap::new(),
                prices: Arc::new(DashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Start monitoring a pair. Returns false if a monitor already exists.
    pub fn start(
        &self,
        owner: OwnerId,
        base: &str,
        quote: &str,
        notifier: Arc<dyn Notifier>,
    ) -> bool {
        let key = MonitorKey::new(owner, base, quote);

        let slot = match self.inner.tasks.entry(key.clone()) {
            Entry::Occupied(_) => {
                info!(key = %key, "Monitor already running");
                return false;
            }
            Entry::Vacant(slot) => slot,
        };

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let alert_state = Arc::new(Mutex::new(AlertState::new()));
        let last_check = Arc::new(Mutex::new(None));

        let ctx = MonitorContext {
            key: key.clone(),
            generation,
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
            poll_interval: self.inner.config.poll_interval,
            coalescer: self.inner.coalescer.clone(),
            pairs: Arc::clone(&self.inner.pairs),
            notifier,
            prices: Arc::clone(&self.inner.prices),
            alert_state: Arc::clone(&alert_state),
            last_check: Arc::clone(&last_check),
            cancel: cancel.clone(),
        };

        let registry: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let key = ctx.key.clone();
            if run_monitor(ctx).await == MonitorExit::PairRemoved {
                if let Some(registry) = registry.upgrade() {
                    registry.retire(&key, generation);
                }
            }
        });

        slot.insert(MonitorEntry {
            generation,
            cancel,
            handle,
            alert_state,
            last_check,
        });
        true
    }

    /// Stop a monitor and discard its alert state. Returns false if none ran.
    pub fn stop(&self, owner: OwnerId, base: &str, quote: &str) -> bool {
        let key = MonitorKey::new(owner, base, quote);

        match self.inner.tasks.remove(&key) {
            Some((_, entry)) => {
                entry.cancel.cancel();
                self.inner.prices.remove(&key);
                info!(key = %key, "Monitor stop requested");
                true
            }
            None => {
                warn!(key = %key, "Monitor was not running");
                false
            }
        }
    }

    /// Re-arm alerts for a running monitor after its range changed.
    pub fn reset_alert(&self, owner: OwnerId, base: &str, quote: &str) -> bool {
        let key = MonitorKey::new(owner, base, quote);

        match self.inner.tasks.get(&key) {
            Some(entry) => {
                lock(&entry.alert_state).reset();
                info!(key = %key, "Alert state reset");
                true
            }
            None => {
                warn!(key = %key, "Cannot reset alert: monitor not running");
                false
            }
        }
    }

    /// Most recent price fetched by a monitor.
    pub fn last_price(&self, owner: OwnerId, base: &str, quote: &str) -> Option<f64> {
        let key = MonitorKey::new(owner, base, quote);
        self.inner.prices.get(&key).map(|cached| cached.price)
    }

    /// Snapshot of a monitor's alert state.
    pub fn alert_state(&self, key: &MonitorKey) -> Option<AlertState> {
        self.inner
            .tasks
            .get(key)
            .map(|entry| lock(&entry.alert_state).clone())
    }

    /// When a monitor last attempted a fetch.
    pub fn last_checked_at(&self, key: &MonitorKey) -> Option<Instant> {
        self.inner
            .tasks
            .get(key)
            .and_then(|entry| *lock(&entry.last_check))
    }

    pub fn is_running(&self, key: &MonitorKey) -> bool {
        self.inner.tasks.contains_key(key)
    }

    pub fn active_count(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Cancel every monitor and wait for the tasks to finish.
    pub async fn shutdown(&self) {
        let keys: Vec<MonitorKey> = self.inner.tasks.iter().map(|e| e.key().clone()).collect();
        let mut handles = Vec::with_capacity(keys.len());

        for key in keys {
            if let Some((_, entry)) = self.inner.tasks.remove(&key) {
                entry.cancel.cancel();
                handles.push(entry.handle);
            }
        }
        self.inner.prices.clear();

        let count = handles.len();
        for handle in handles {
            let _ = handle.await;
        }
        info!(count, "All monitors stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::PairBook;
    use crate::notifier::{NotifyError, RecordingNotifier};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use pricewatch_core::{PriceRange, TrackedPair};
    use pricewatch_feeds::{FeedError, MockOracle, PriceOracle};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const INTERVAL: Duration = Duration::from_secs(60);

    struct Harness {
        oracle: Arc<MockOracle>,
        book: PairBook,
        notifier: Arc<RecordingNotifier>,
        registry: MonitorRegistry,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_oracle(Arc::new(MockOracle::new()))
        }

        fn with_oracle(oracle: Arc<MockOracle>) -> Self {
            let book = PairBook::new();
            let registry = MonitorRegistry::new(
                EngineConfig {
                    poll_interval: INTERVAL,
                },
                RequestCoalescer::new(oracle.clone()),
                Arc::new(book.clone()),
            );
            Self {
                oracle,
                book,
                notifier: Arc::new(RecordingNotifier::new()),
                registry,
            }
        }

        fn track(&self, owner: OwnerId, base: &str, quote: &str, range: PriceRange) {
            self.book
                .add(TrackedPair::new(owner, base, quote).with_range(range))
                .unwrap();
        }

        fn start(&self, owner: OwnerId, base: &str, quote: &str) -> bool {
            self.registry.start(owner, base, quote, self.notifier.clone())
        }
    }

    /// Advance paused time and let spawned tasks settle.
    async fn advance(duration: Duration) {
        tokio::time::sleep(duration).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_notification_per_excursion() {
        let h = Harness::new();
        h.track(1, "BTC", "USDT", PriceRange::new(Some(100.0), None).unwrap());
        for price in [150.0, 95.0, 94.0, 93.0] {
            h.oracle.push_price("BTC", "USDT", price);
        }
        assert!(h.start(1, "BTC", "USDT"));

        advance(Duration::from_secs(1)).await; // 150: baseline
        assert!(h.notifier.messages().is_empty());

        advance(INTERVAL).await; // 95: crosses min
        assert_eq!(h.notifier.messages().len(), 1);
        assert!(h.notifier.messages()[0].1.contains("95.0000"));

        advance(INTERVAL).await; // 94: already alerted
        assert_eq!(h.notifier.messages().len(), 1);

        assert!(h.registry.reset_alert(1, "BTC", "USDT"));
        advance(INTERVAL).await; // 93: re-armed
        let messages = h.notifier.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].0, 1);
        assert!(messages[1].1.contains("93.0000"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_pair_never_notifies() {
        let h = Harness::new();
        h.track(1, "ETH", "USDT", PriceRange::UNBOUNDED);
        for price in [3000.0, 1.0, 90000.0, 0.5] {
            h.oracle.push_price("ETH", "USDT", price);
        }
        h.start(1, "ETH", "USDT");

        advance(INTERVAL * 3 + Duration::from_secs(1)).await;
        assert_eq!(h.oracle.calls(), 4);
        assert!(h.notifier.messages().is_empty());

        let key = MonitorKey::new(1, "ETH", "USDT");
        assert_eq!(h.registry.alert_state(&key), Some(AlertState::new()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cadence_one_fetch_per_interval() {
        let h = Harness::new();
        h.track(1, "SOL", "USDT", PriceRange::UNBOUNDED);
        h.oracle.push_price("SOL", "USDT", 100.0);
        h.start(1, "SOL", "USDT");

        advance(Duration::from_secs(1)).await;
        assert_eq!(h.oracle.calls(), 1);
        assert_eq!(h.registry.last_price(1, "SOL", "USDT"), Some(100.0));
        assert!(h
            .registry
            .last_checked_at(&MonitorKey::new(1, "SOL", "USDT"))
            .is_some());

        advance(Duration::from_secs(30)).await;
        assert_eq!(h.oracle.calls(), 1);

        advance(Duration::from_secs(30)).await;
        assert_eq!(h.oracle.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_backs_off_one_interval() {
        let h = Harness::new();
        h.track(1, "BTC", "USDT", PriceRange::UNBOUNDED);
        h.oracle
            .push_failure("BTC", "USDT", FeedError::Timeout("5s".into()));
        h.oracle.push_price("BTC", "USDT", 65000.0);
        h.start(1, "BTC", "USDT");

        advance(Duration::from_secs(30)).await;
        assert_eq!(h.oracle.calls(), 1);
        assert_eq!(h.registry.last_price(1, "BTC", "USDT"), None);

        advance(Duration::from_secs(31)).await;
        assert_eq!(h.oracle.calls(), 2);
        assert_eq!(h.registry.last_price(1, "BTC", "USDT"), Some(65000.0));
        assert!(h.registry.is_running(&MonitorKey::new(1, "BTC", "USDT")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let h = Harness::new();
        h.track(1, "BTC", "USDT", PriceRange::UNBOUNDED);
        h.oracle.push_price("BTC", "USDT", 1.0);

        assert!(h.start(1, "BTC", "USDT"));
        assert!(!h.start(1, "btc", "usdt"));
        assert_eq!(h.registry.active_count(), 1);

        advance(Duration::from_secs(1)).await;
        assert_eq!(h.oracle.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_then_start_gives_fresh_state() {
        let h = Harness::new();
        h.track(1, "BTC", "USDT", PriceRange::new(Some(100.0), None).unwrap());
        h.oracle.push_price("BTC", "USDT", 150.0);
        h.oracle.push_price("BTC", "USDT", 90.0);
        h.start(1, "BTC", "USDT");

        advance(INTERVAL + Duration::from_secs(1)).await;
        let key = MonitorKey::new(1, "BTC", "USDT");
        assert!(h.registry.alert_state(&key).unwrap().alerted);

        assert!(h.registry.stop(1, "BTC", "USDT"));
        assert!(!h.registry.is_running(&key));
        assert_eq!(h.registry.last_price(1, "BTC", "USDT"), None);

        assert!(h.start(1, "BTC", "USDT"));
        assert_eq!(h.registry.active_count(), 1);
        assert_eq!(h.registry.alert_state(&key), Some(AlertState::new()));
        assert_eq!(h.registry.last_checked_at(&key), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_unknown_is_noop() {
        let h = Harness::new();
        assert!(!h.registry.stop(1, "BTC", "USDT"));
        assert!(!h.registry.reset_alert(1, "BTC", "USDT"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_monitor_stops_fetching() {
        let h = Harness::new();
        h.track(1, "BTC", "USDT", PriceRange::UNBOUNDED);
        h.oracle.push_price("BTC", "USDT", 1.0);
        h.start(1, "BTC", "USDT");

        advance(Duration::from_secs(1)).await;
        h.registry.stop(1, "BTC", "USDT");
        advance(INTERVAL * 3).await;
        assert_eq!(h.oracle.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_pair_retires_monitor() {
        let h = Harness::new();
        h.track(1, "BTC", "USDT", PriceRange::UNBOUNDED);
        h.oracle.push_price("BTC", "USDT", 1.0);
        h.start(1, "BTC", "USDT");

        advance(Duration::from_secs(1)).await;
        h.book.remove(1, "BTC", "USDT");

        advance(INTERVAL).await;
        let key = MonitorKey::new(1, "BTC", "USDT");
        assert!(!h.registry.is_running(&key));
        assert_eq!(h.registry.last_price(1, "BTC", "USDT"), None);

        advance(INTERVAL * 2).await;
        assert_eq!(h.oracle.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_delivery_keeps_flag_set() {
        let h = Harness::new();
        h.notifier.set_failing(true);
        h.track(1, "BTC", "USDT", PriceRange::new(None, Some(200.0)).unwrap());
        for price in [150.0, 210.0, 220.0] {
            h.oracle.push_price("BTC", "USDT", price);
        }
        h.start(1, "BTC", "USDT");

        advance(INTERVAL * 2 + Duration::from_secs(1)).await;
        assert_eq!(h.notifier.attempts(), 1);
        assert!(h.notifier.messages().is_empty());
        let key = MonitorKey::new(1, "BTC", "USDT");
        assert!(h.registry.alert_state(&key).unwrap().alerted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_owners_share_one_fetch_per_symbol() {
        let oracle = Arc::new(MockOracle::new().with_delay(Duration::from_secs(2)));
        oracle.push_price("BTC", "USDT", 65000.0);
        let h = Harness::with_oracle(oracle);
        h.track(1, "BTC", "USDT", PriceRange::UNBOUNDED);
        h.track(2, "BTC", "USDT", PriceRange::UNBOUNDED);
        h.start(1, "BTC", "USDT");
        h.start(2, "BTC", "USDT");

        advance(Duration::from_secs(3)).await;
        assert_eq!(h.oracle.calls(), 1);
        assert_eq!(h.registry.last_price(1, "BTC", "USDT"), Some(65000.0));
        assert_eq!(h.registry.last_price(2, "BTC", "USDT"), Some(65000.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_everything() {
        let h = Harness::new();
        h.track(1, "BTC", "USDT", PriceRange::UNBOUNDED);
        h.track(2, "ETH", "USDT", PriceRange::UNBOUNDED);
        h.start(1, "BTC", "USDT");
        h.start(2, "ETH", "USDT");

        h.registry.shutdown().await;
        assert_eq!(h.registry.active_count(), 0);
    }

    /// Oracle that records the highest number of overlapping fetches.
    struct OverlapTracker {
        active: AtomicUsize,
        max_active: AtomicUsize,
        calls: AtomicUsize,
        latency: Duration,
    }

    #[async_trait]
    impl PriceOracle for OverlapTracker {
        async fn fetch(&self, _base: &str, _quote: &str) -> Result<f64, FeedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(100.0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_never_overlaps() {
        let tracker = Arc::new(OverlapTracker {
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            latency: Duration::from_secs(90),
        });
        let book = PairBook::new();
        book.add(TrackedPair::new(1, "BTC", "USDT")).unwrap();
        let registry = MonitorRegistry::new(
            EngineConfig {
                poll_interval: INTERVAL,
            },
            RequestCoalescer::new(tracker.clone()),
            Arc::new(book),
        );
        registry.start(1, "BTC", "USDT", Arc::new(RecordingNotifier::new()));

        advance(Duration::from_secs(400)).await;
        assert_eq!(tracker.max_active.load(Ordering::SeqCst), 1);
        // Fetches start at 0, 90, 180, 270, 360
        assert_eq!(tracker.calls.load(Ordering::SeqCst), 5);
    }

    struct PanickingNotifier;

    #[async_trait]
    impl Notifier for PanickingNotifier {
        async fn send(&self, _owner: OwnerId, _text: &str) -> Result<(), NotifyError> {
            panic!("notifier blew up");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluation_panic_does_not_kill_monitor() {
        let h = Harness::new();
        h.track(1, "BTC", "USDT", PriceRange::new(Some(100.0), None).unwrap());
        for price in [150.0, 90.0, 80.0] {
            h.oracle.push_price("BTC", "USDT", price);
        }
        h.registry
            .start(1, "BTC", "USDT", Arc::new(PanickingNotifier));

        advance(INTERVAL * 2 + Duration::from_secs(1)).await;
        assert!(h.registry.is_running(&MonitorKey::new(1, "BTC", "USDT")));
        assert_eq!(h.registry.last_price(1, "BTC", "USDT"), Some(80.0));
    }
}
