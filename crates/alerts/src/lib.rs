//! Telegram front-end for the price watch bot.
//!
//! This crate provides:
//! - SQLite storage of tracked pairs
//! - Telegram command handling and alert delivery
//! - Per-chat command rate limiting

pub mod db;
pub mod notifier;
pub mod ratelimit;
pub mod telegram;

pub use db::{Database, DbError};
pub use notifier::TelegramNotifier;
pub use ratelimit::RateLimiter;
pub use telegram::{Command, CommandHandler, TelegramBot, TelegramError};
