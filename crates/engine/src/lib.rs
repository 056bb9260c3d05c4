//! Price monitoring engine.
//!
//! One long-lived task per (owner, symbol) polls the price oracle through a
//! request coalescer, caches the last price and hands each sample to the
//! alert evaluator on a detached task.

pub mod book;
pub mod coalescer;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod monitor;
pub mod notifier;
pub mod registry;
pub mod service;

pub use book::*;
pub use coalescer::*;
pub use config::*;
pub use error::*;
pub use evaluator::*;
pub use monitor::MonitorState;
pub use notifier::*;
pub use registry::*;
pub use service::*;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
