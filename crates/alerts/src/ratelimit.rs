//! Per-chat sliding-window command rate limiting.

use dashmap::DashMap;
use pricewatch_core::OwnerId;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

/// Allows at most `calls` commands per chat within any `period`.
pub struct RateLimiter {
    calls: usize,
    period: Duration,
    history: DashMap<OwnerId, VecDeque<Instant>>,
    last_sweep: Mutex<Option<Instant>>,
}

/// Drop calls that fell out of the window ending at `now`.
fn prune(history: &mut VecDeque<Instant>, now: Instant, period: Duration) {
    while let Some(&oldest) = history.front() {
        if now.duration_since(oldest) < period {
            break;
        }
        history.pop_front();
    }
}

impl RateLimiter {
    pub fn new(calls: usize, period: Duration) -> Self {
        Self {
            calls: calls.max(1),
            period,
            history: DashMap::new(),
            last_sweep: Mutex::new(None),
        }
    }

    /// `calls` commands per minute.
    pub fn per_minute(calls: usize) -> Self {
        Self::new(calls, Duration::from_secs(60))
    }

    /// Record a command from `chat`, or return how long it must wait.
    pub fn check(&self, chat: OwnerId) -> Result<(), Duration> {
        self.check_at(chat, Instant::now())
    }

    pub fn check_at(&self, chat: OwnerId, now: Instant) -> Result<(), Duration> {
        self.sweep_if_due(now);

        let mut history = self.history.entry(chat).or_default();
        prune(&mut history, now, self.period);

        if history.len() >= self.calls {
            let wait = history
                .front()
                .map(|&oldest| self.period.saturating_sub(now.duration_since(oldest)))
                .unwrap_or_default();
            warn!(chat, recent = history.len(), limit = self.calls, "Rate limit hit");
            return Err(wait);
        }

        history.push_back(now);
        Ok(())
    }

    /// Chats with calls inside the current window.
    pub fn tracked_chats(&self) -> usize {
        self.history.len()
    }

    /// At most once per period, forget chats whose window is empty.
    fn sweep_if_due(&self, now: Instant) {
        {
            let mut last = self
                .last_sweep
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match *last {
                Some(at) if now.duration_since(at) < self.period => return,
                _ => *last = Some(now),
            }
        }

        self.history.retain(|_, history| {
            prune(history, now, self.period);
            !history.is_empty()
        });
    }
}
