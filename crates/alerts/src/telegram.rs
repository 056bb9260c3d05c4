//! Telegram bot handlers.

use crate::db::Database;
use crate::ratelimit::RateLimiter;
use pricewatch_core::{format_price, parse_price_input, validate_pair, OwnerId, PriceRange};
use pricewatch_engine::{EngineError, MonitorService, PriceStatus};
use std::fmt::Write as _;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("Telegram API error: {0}")]
    Api(#[from] teloxide::RequestError),
}

/// Bot commands.
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Start the bot")]
    Start,
    #[command(description = "Show help")]
    Help,
    #[command(description = "Track a pair. Usage: /add BTC USDT", parse_with = "split")]
    Add { base: String, quote: String },
    #[command(
        description = "Set alert range, '-' leaves a side unset. Usage: /range BTC USDT 60000 70000",
        parse_with = "split"
    )]
    Range {
        base: String,
        quote: String,
        min: String,
        max: String,
    },
    #[command(description = "Stop tracking a pair. Usage: /remove BTC USDT", parse_with = "split")]
    Remove { base: String, quote: String },
    #[command(description = "List tracked pairs")]
    Pairs,
    #[command(description = "Show last prices of tracked pairs")]
    Prices,
    #[command(description = "Get a live price. Usage: /price ETH BTC", parse_with = "split")]
    Price { base: String, quote: String },
}

const WELCOME: &str = "👋 Hi! I watch crypto prices for you.\n\n\
                       📊 Prices are checked every poll interval\n\
                       🔔 You get one alert when a price leaves your range\n\n\
                       Use /add to track a pair and /help for all commands.";

const PENDING: &str = "⏳ waiting for update";

/// Executes commands against the monitoring service and pair storage.
pub struct CommandHandler {
    service: MonitorService,
    db: Database,
    limiter: RateLimiter,
}

impl CommandHandler {
    pub fn new(service: MonitorService, db: Database, limiter: RateLimiter) -> Self {
        Self {
            service,
            db,
            limiter,
        }
    }

    /// Run a command for `chat` and return the reply text.
    pub async fn handle(&self, chat: OwnerId, cmd: Command) -> String {
        if let Err(wait) = self.limiter.check(chat) {
            return format!(
                "⚠️ Please wait {:.1} seconds before the next command.",
                wait.as_secs_f64()
            );
        }

        match cmd {
            Command::Start => {
                info!(chat, "User started the bot");
                WELCOME.to_string()
            }
            Command::Help => Command::descriptions().to_string(),
            Command::Add { base, quote } => self.add(chat, &base, &quote).await,
            Command::Range {
                base,
                quote,
                min,
                max,
            } => self.set_range(chat, &base, &quote, &min, &max).await,
            Command::Remove { base, quote } => self.remove(chat, &base, &quote).await,
            Command::Pairs => self.list_pairs(chat),
            Command::Prices => self.list_prices(chat),
            Command::Price { base, quote } => self.live_price(&base, &quote).await,
        }
    }

    async fn add(&self, chat: OwnerId, base: &str, quote: &str) -> String {
        let pair = match self.service.track_pair(chat, base, quote) {
            Ok(pair) => pair,
            Err(EngineError::DuplicatePair { symbol, .. }) => {
                return format!("❌ Pair {} is already tracked.", symbol)
            }
            Err(e) => return format!("❌ {}", e),
        };

        if let Err(e) = self.db.upsert_pair(&pair).await {
            warn!(chat, symbol = %pair.symbol(), error = %e, "Failed to persist pair");
        }

        format!(
            "✅ Pair {}/{} added!\n\n💡 Set an alert range with /range {} {} MIN MAX",
            pair.base, pair.quote, pair.base, pair.quote
        )
    }

    async fn set_range(&self, chat: OwnerId, base: &str, quote: &str, min: &str, max: &str) -> String {
        let range = match parse_range(min, max) {
            Ok(range) => range,
            Err(e) => return format!("❌ {}. Enter a positive number or '-' to skip.", e),
        };

        let pair = match self.service.set_range(chat, base, quote, range) {
            Ok(pair) => pair,
            Err(e) => return format!("❌ {}", e),
        };

        if let Err(e) = self.db.update_range(chat, &pair.base, &pair.quote, range).await {
            warn!(chat, symbol = %pair.symbol(), error = %e, "Failed to persist range");
        }

        format!("✅ Range for {}/{} set: {}", pair.base, pair.quote, pair.range)
    }

    async fn remove(&self, chat: OwnerId, base: &str, quote: &str) -> String {
        let pair = match self.service.untrack_pair(chat, base, quote) {
            Ok(pair) => pair,
            Err(e) => return format!("❌ {}", e),
        };

        if let Err(e) = self.db.delete_pair(chat, &pair.base, &pair.quote).await {
            warn!(chat, symbol = %pair.symbol(), error = %e, "Failed to delete pair");
        }

        format!("🗑 Pair {}/{} removed.", pair.base, pair.quote)
    }

    fn list_pairs(&self, chat: OwnerId) -> String {
        let pairs = self.service.pairs_for(chat);
        if pairs.is_empty() {
            return "You have no tracked pairs. Use /add to add one.".to_string();
        }

        let mut text = String::from("📊 Your tracked pairs:\n\n");
        for (i, pair) in pairs.iter().enumerate() {
            let _ = writeln!(text, "{}. {}/{}  range: {}", i + 1, pair.base, pair.quote, pair.range);
        }
        text
    }

    fn list_prices(&self, chat: OwnerId) -> String {
        let pairs = self.service.pairs_for(chat);
        if pairs.is_empty() {
            return "You have no tracked pairs. Use /add to add one.".to_string();
        }

        let mut text = String::from("📈 Current prices:\n\n");
        for pair in &pairs {
            let price = match self.service.get_last_price(chat, &pair.base, &pair.quote) {
                PriceStatus::Ready(price) => format_price(price),
                PriceStatus::Pending => PENDING.to_string(),
            };
            let _ = writeln!(text, "{}/{}: {}", pair.base, pair.quote, price);
        }
        text
    }

    async fn live_price(&self, base: &str, quote: &str) -> String {
        if let Err(e) = validate_pair(base, quote) {
            return format!("❌ {}", e);
        }
        match self.service.quote(base, quote).await {
            Ok(price) => format!(
                "💰 {}/{}: {}",
                base.to_uppercase(),
                quote.to_uppercase(),
                format_price(price)
            ),
            Err(e) => {
                warn!(base, quote, error = %e, "Live price request failed");
                "❌ Could not fetch the price right now, try again later.".to_string()
            }
        }
    }
}

fn parse_range(min: &str, max: &str) -> pricewatch_core::CoreResult<PriceRange> {
    PriceRange::new(parse_price_input(min)?, parse_price_input(max)?)
}

/// Telegram bot wrapper.
pub struct TelegramBot {
    bot: Bot,
    commands: CommandHandler,
}

impl TelegramBot {
    pub fn new(bot: Bot, commands: CommandHandler) -> Self {
        Self { bot, commands }
    }

    /// Run the command dispatcher until Ctrl+C.
    pub async fn run(self: Arc<Self>) {
        let bot = self.bot.clone();
        let handler = Update::filter_message().filter_command::<Command>().endpoint(
            move |bot: Bot, msg: Message, cmd: Command| {
                let this = Arc::clone(&self);
                async move { this.reply(bot, msg, cmd).await }
            },
        );

        Dispatcher::builder(bot, handler)
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    }

    async fn reply(&self, bot: Bot, msg: Message, cmd: Command) -> Result<(), TelegramError> {
        let text = self.commands.handle(msg.chat.id.0, cmd).await;
        bot.send_message(msg.chat.id, text).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use pricewatch_engine::{EngineConfig, RecordingNotifier};
    use pricewatch_feeds::MockOracle;

    async fn handler(limit: usize) -> (Arc<MockOracle>, CommandHandler) {
        let oracle = Arc::new(MockOracle::new());
        let service = MonitorService::new(
            EngineConfig::default(),
            oracle.clone(),
            Arc::new(RecordingNotifier::new()),
        );
        let db = Database::connect("sqlite::memory:").await.unwrap();
        (oracle, CommandHandler::new(service, db, RateLimiter::per_minute(limit)))
    }

    fn add(base: &str, quote: &str) -> Command {
        Command::Add {
            base: base.into(),
            quote: quote.into(),
        }
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(Command::parse("/add btc usdt", "bot").unwrap(), add("btc", "usdt"));
        assert_eq!(
            Command::parse("/range BTC USDT - 70000", "bot").unwrap(),
            Command::Range {
                base: "BTC".into(),
                quote: "USDT".into(),
                min: "-".into(),
                max: "70000".into(),
            }
        );
        assert!(Command::parse("/add BTC", "bot").is_err());
        assert_eq!(Command::parse("/pairs", "bot").unwrap(), Command::Pairs);
    }

    #[tokio::test]
    async fn test_add_persists_and_lists() {
        let (_, handler) = handler(60).await;

        let reply = handler.handle(1, add("btc", "usdt")).await;
        assert!(reply.contains("BTC/USDT added"));
        assert!(handler.handle(1, add("BTC", "USDT")).await.contains("already tracked"));

        let stored = handler.db.load_pairs().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(handler.handle(1, Command::Pairs).await.contains("1. BTC/USDT"));
    }

    #[tokio::test]
    async fn test_range_validation() {
        let (_, handler) = handler(60).await;
        handler.handle(1, add("ETH", "USDT")).await;

        let range = |min: &str, max: &str| Command::Range {
            base: "ETH".into(),
            quote: "USDT".into(),
            min: min.into(),
            max: max.into(),
        };

        assert!(handler.handle(1, range("abc", "-")).await.starts_with("❌"));
        assert!(handler.handle(1, range("3000", "2000")).await.starts_with("❌"));
        assert!(handler.handle(1, range("-5", "-")).await.starts_with("❌"));

        let reply = handler.handle(1, range("2500,5", "-")).await;
        assert!(reply.starts_with("✅"), "{}", reply);
        let stored = handler.db.load_pairs().await.unwrap();
        assert_eq!(stored[0].range.min(), Some(2500.5));
        assert_eq!(stored[0].range.max(), None);
    }

    #[tokio::test]
    async fn test_remove_unknown_pair() {
        let (_, handler) = handler(60).await;
        let reply = handler
            .handle(
                1,
                Command::Remove {
                    base: "SOL".into(),
                    quote: "USDT".into(),
                },
            )
            .await;
        assert!(reply.starts_with("❌"));
    }

    #[tokio::test]
    async fn test_prices_pending_before_first_fetch() {
        let (_, handler) = handler(60).await;
        handler.handle(1, add("BTC", "USDT")).await;

        let reply = handler.handle(1, Command::Prices).await;
        assert!(reply.contains("BTC/USDT: ⏳"), "{}", reply);
    }

    #[tokio::test]
    async fn test_live_price() {
        let (oracle, handler) = handler(60).await;
        oracle.push_price("ETH", "BTC", 0.05);

        let price = |base: &str, quote: &str| Command::Price {
            base: base.into(),
            quote: quote.into(),
        };
        assert_eq!(handler.handle(1, price("eth", "btc")).await, "💰 ETH/BTC: 0.05000000");
        assert!(handler.handle(1, price("FOO", "BTC")).await.starts_with("❌"));
        assert!(handler.handle(1, price("SOL", "USDT")).await.contains("Could not fetch"));
    }

    #[tokio::test]
    async fn test_rate_limit_applies_per_chat() {
        let (_, handler) = handler(2).await;
        handler.handle(1, Command::Start).await;
        handler.handle(1, Command::Help).await;

        let reply = handler.handle(1, Command::Pairs).await;
        assert!(reply.starts_with("⚠️ Please wait"));
        assert_eq!(handler.handle(2, Command::Start).await, WELCOME);
    }
}
