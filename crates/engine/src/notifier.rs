//! Notification delivery seam.

use async_trait::async_trait;
use pricewatch_core::OwnerId;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(OwnerId),
}

/// Delivers alert text to a pair owner.
///
/// Failures are logged by the engine and never retried.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, owner: OwnerId, text: &str) -> Result<(), NotifyError>;
}

/// Notifier that records messages instead of delivering them.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(OwnerId, String)>>,
    attempts: AtomicUsize,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent send fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Messages delivered so far.
    pub fn messages(&self) -> Vec<(OwnerId, String)> {
        crate::lock(&self.messages).clone()
    }

    /// Number of send calls, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, owner: OwnerId, text: &str) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("recording notifier set to fail".into()));
        }
        crate::lock(&self.messages).push((owner, text.to_string()));
        Ok(())
    }
}
