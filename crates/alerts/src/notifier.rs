//! Telegram delivery of price alerts.

use async_trait::async_trait;
use pricewatch_core::OwnerId;
use pricewatch_engine::{Notifier, NotifyError};
use teloxide::prelude::*;
use teloxide::{ApiError, RequestError};
use tracing::debug;

/// Sends alert text to the owning chat.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn delivery_error(owner: OwnerId, error: RequestError) -> NotifyError {
    match error {
        RequestError::Api(ApiError::ChatNotFound) => NotifyError::InvalidRecipient(owner),
        other => NotifyError::Delivery(other.to_string()),
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, owner: OwnerId, text: &str) -> Result<(), NotifyError> {
        self.bot
            .send_message(ChatId(owner), text)
            .await
            .map_err(|e| delivery_error(owner, e))?;

        debug!(owner, "Telegram message delivered");
        Ok(())
    }
}
