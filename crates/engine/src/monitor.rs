//! Per-pair polling loop.

use crate::book::PairLookup;
use crate::coalescer::RequestCoalescer;
use crate::evaluator::{AlertDecision, AlertState};
use crate::lock;
use crate::notifier::Notifier;
use dashmap::DashMap;
use futures_util::FutureExt;
use pricewatch_core::{MonitorKey, PriceRange};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle of a monitor task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Running,
    /// Terminal.
    Cancelled,
}

/// Why a monitor loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MonitorExit {
    Cancelled,
    PairRemoved,
}

impl MonitorExit {
    /// Every exit ends the task.
    pub(crate) fn state(self) -> MonitorState {
        match self {
            MonitorExit::Cancelled | MonitorExit::PairRemoved => MonitorState::Cancelled,
        }
    }
}

/// Last fetched price, tagged with the monitor generation that wrote it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CachedPrice {
    pub generation: u64,
    pub price: f64,
}

/// Everything one monitor task needs, shared with the registry where noted.
pub(crate) struct MonitorContext {
    pub key: MonitorKey,
    pub generation: u64,
    pub base: String,
    pub quote: String,
    pub poll_interval: Duration,
    pub coalescer: RequestCoalescer,
    pub pairs: Arc<dyn PairLookup>,
    pub notifier: Arc<dyn Notifier>,
    /// Last price cache, shared with the registry.
    pub prices: Arc<DashMap<MonitorKey, CachedPrice>>,
    /// Shared with the registry for `reset_alert`.
    pub alert_state: Arc<Mutex<AlertState>>,
    /// `None` until the first fetch attempt.
    pub last_check: Arc<Mutex<Option<Instant>>>,
    pub cancel: CancellationToken,
}

impl MonitorContext {
    /// Sleep unless cancelled first. Returns false on cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Record a fetch attempt now, or return how long to wait before one.
    fn claim_slot(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut last_check = lock(&self.last_check);
        if let Some(last) = *last_check {
            let elapsed = now.duration_since(last);
            if elapsed < self.poll_interval {
                return Some(self.poll_interval - elapsed);
            }
        }
        *last_check = Some(now);
        None
    }

    /// Cache a fetched price. Returns false if the monitor was cancelled,
    /// in which case nothing it wrote is left behind.
    fn publish(&self, price: f64) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let generation = self.generation;
        self.prices
            .insert(self.key.clone(), CachedPrice { generation, price });

        // `stop` may have cleared the cache between the check and the insert.
        if self.cancel.is_cancelled() {
            self.prices
                .remove_if(&self.key, |_, cached| cached.generation == generation);
            return false;
        }
        true
    }
}

/// Poll the oracle until cancelled or the tracked pair disappears.
pub(crate) async fn run_monitor(ctx: MonitorContext) -> MonitorExit {
    info!(
        key = %ctx.key,
        interval = ?ctx.poll_interval,
        state = ?MonitorState::Running,
        "Monitor started"
    );

    let exit = loop {
        if ctx.cancel.is_cancelled() {
            break MonitorExit::Cancelled;
        }

        // Re-check after waking rather than trusting the sleep length.
        if let Some(wait) = ctx.claim_slot() {
            if !ctx.pause(wait).await {
                break MonitorExit::Cancelled;
            }
            continue;
        }

        let outcome = tokio::select! {
            _ = ctx.cancel.cancelled() => break MonitorExit::Cancelled,
            outcome = ctx.coalescer.resolve(&ctx.base, &ctx.quote) => outcome,
        };

        let price = match outcome {
            Ok(price) => price,
            Err(e) => {
                warn!(key = %ctx.key, error = %e, "Failed to fetch price");
                if !ctx.pause(ctx.poll_interval).await {
                    break MonitorExit::Cancelled;
                }
                continue;
            }
        };

        if !ctx.publish(price) {
            break MonitorExit::Cancelled;
        }
        debug!(key = %ctx.key, price, "Price updated");

        let Some(pair) = ctx.pairs.find(ctx.key.owner, &ctx.base, &ctx.quote) else {
            error!(key = %ctx.key, "Tracked pair not found, stopping monitor");
            break MonitorExit::PairRemoved;
        };

        if pair.range.is_configured() {
            spawn_evaluation(&ctx, price, pair.range);
        }
    };

    info!(key = %ctx.key, state = ?exit.state(), ?exit, "Monitor stopped");
    exit
}

/// Evaluate a sample on a detached task. Panics are contained and logged.
fn spawn_evaluation(ctx: &MonitorContext, price: f64, range: PriceRange) {
    let key = ctx.key.clone();
    let alert_state = Arc::clone(&ctx.alert_state);
    let notifier = Arc::clone(&ctx.notifier);

    tokio::spawn(async move {
        let evaluation = evaluate_and_notify(&key, &alert_state, notifier.as_ref(), price, range);
        if AssertUnwindSafe(evaluation).catch_unwind().await.is_err() {
            error!(key = %key, "Alert evaluation panicked");
        }
    });
}

async fn evaluate_and_notify(
    key: &MonitorKey,
    alert_state: &Mutex<AlertState>,
    notifier: &dyn Notifier,
    price: f64,
    range: PriceRange,
) {
    let decision = lock(alert_state).evaluate(&key.symbol, price, &range);

    match decision {
        AlertDecision::Notify(alert) => {
            info!(key = %key, price, bound = ?alert.bound, "Alert triggered");
            match notifier.send(key.owner, &alert.message()).await {
                Ok(()) => info!(key = %key, price, "Alert sent"),
                // The flag stays set: this excursion is not re-notified.
                Err(e) => error!(key = %key, error = %e, "Failed to send alert"),
            }
        }
        AlertDecision::AlreadyAlerted => {
            info!(key = %key, price, "Price still out of range (already notified)")
        }
        AlertDecision::Baseline | AlertDecision::Jitter | AlertDecision::InRange => {
            debug!(key = %key, price, ?decision, "No alert")
        }
    }
}
