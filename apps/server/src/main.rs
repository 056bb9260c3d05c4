//! Price Watch Bot - Telegram server
//!
//! Tracks crypto pair prices per chat and sends one alert when a price
//! leaves its configured range.

mod config;

use clap::Parser;
use config::Settings;
use pricewatch_alerts::{CommandHandler, Database, RateLimiter, TelegramBot, TelegramNotifier};
use pricewatch_engine::MonitorService;
use pricewatch_feeds::BinanceOracle;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use teloxide::Bot;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Price Watch Bot CLI
#[derive(Parser, Debug)]
#[command(name = "pricewatch-bot")]
#[command(about = "Telegram bot that alerts when crypto prices leave a range", long_about = None)]
struct Args {
    /// Seconds between price checks (10-3600), overrides UPDATE_INTERVAL
    #[arg(short, long)]
    interval: Option<u64>,

    /// Commands per chat per minute, overrides RATE_LIMIT
    #[arg(short, long)]
    rate_limit: Option<usize>,

    /// SQLite database URL, overrides DATABASE_URL
    #[arg(short, long)]
    database_url: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long)]
    log_level: Option<String>,
}

fn init_logging(level: &str) -> Result<(), Box<dyn Error>> {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn load_settings(args: Args) -> Result<Settings, Box<dyn Error>> {
    let mut settings = Settings::from_env()?;

    if let Some(interval) = args.interval {
        settings.set_update_interval(interval);
    }
    if let Some(rate_limit) = args.rate_limit {
        settings.rate_limit = rate_limit;
    }
    if let Some(url) = args.database_url {
        settings.database_url = url;
    }
    if let Some(level) = args.log_level {
        settings.log_level = level.to_lowercase();
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let settings = load_settings(args)?;

    init_logging(&settings.log_level)?;
    settings.log_adjustments();

    info!("🚀 Price Watch Bot starting...");
    info!("  Update interval: {} seconds", settings.update_interval);
    info!("  Rate limit: {} commands/minute", settings.rate_limit);
    info!("  Database: {}", settings.database_url);

    let db = Database::connect(&settings.database_url).await?;
    let oracle = Arc::new(BinanceOracle::new(settings.oracle_config())?);
    let bot = Bot::new(&settings.telegram_token);
    let notifier = Arc::new(TelegramNotifier::new(bot.clone()));

    let service = MonitorService::new(settings.engine_config(), oracle, notifier);

    match db.load_pairs().await {
        Ok(pairs) => {
            let restored = service.restore(pairs);
            info!("  Restored {} tracked pairs", restored);
        }
        Err(e) => warn!("Failed to load tracked pairs, starting empty: {}", e),
    }

    let commands = CommandHandler::new(
        service.clone(),
        db,
        RateLimiter::per_minute(settings.rate_limit),
    );
    let telegram = Arc::new(TelegramBot::new(bot, commands));

    info!("Press Ctrl+C to stop...");
    telegram.run().await;

    warn!("Shutdown signal received");
    if tokio::time::timeout(Duration::from_secs(5), service.shutdown())
        .await
        .is_err()
    {
        warn!("Monitors did not stop in time");
    }

    info!("👋 Price Watch Bot stopped");
    Ok(())
}
