//! Binance REST price oracle.
//!
//! Prices come from the book ticker mid price. Pairs Binance does not
//! list directly are derived from both legs' USDT prices.

use crate::error::FeedError;
use crate::oracle::{positive_price, PriceOracle};
use async_trait::async_trait;
use futures_util::future::try_join;
use pricewatch_core::symbol;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Quote asset used for cross-rate derivation.
const CROSS_QUOTE: &str = "USDT";

/// Configuration for the Binance oracle.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// REST API root
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Attempts per request before giving up
    pub max_retries: u32,
    /// Delay between attempts
    pub retry_delay: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            timeout: Duration::from_secs(5),
            max_retries: 2,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Book ticker response: {"symbol":"BTCUSDT","bidPrice":"...","bidQty":"...","askPrice":"...","askQty":"..."}
#[derive(Debug, Deserialize)]
struct BookTicker {
    #[serde(rename = "bidPrice")]
    bid_price: String,
    #[serde(rename = "askPrice")]
    ask_price: String,
}

/// Ticker price response: {"symbol":"BTCUSDT","price":"..."}
#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

fn parse_decimal(field: &str, value: &str) -> Result<f64, FeedError> {
    value
        .parse::<f64>()
        .map_err(|_| FeedError::ParseError(format!("Invalid {}: {}", field, value)))
}

/// Parse a book ticker body into its mid price.
pub fn parse_book_ticker_mid(body: &str) -> Result<f64, FeedError> {
    let ticker: BookTicker = serde_json::from_str(body)?;
    let bid = parse_decimal("bidPrice", &ticker.bid_price)?;
    let ask = parse_decimal("askPrice", &ticker.ask_price)?;
    positive_price((bid + ask) / 2.0)
}

/// Parse a ticker price body.
pub fn parse_ticker_price(body: &str) -> Result<f64, FeedError> {
    let ticker: TickerPrice = serde_json::from_str(body)?;
    positive_price(parse_decimal("price", &ticker.price)?)
}

/// Price oracle backed by the Binance public REST API.
pub struct BinanceOracle {
    client: reqwest::Client,
    config: OracleConfig,
}

impl BinanceOracle {
    /// Create a new oracle with its own pooled HTTP client.
    pub fn new(config: OracleConfig) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent("pricewatch/0.1")
            .pool_max_idle_per_host(30)
            .build()?;

        Ok(Self { client, config })
    }

    /// GET a Binance endpoint, mapping 400 to `SymbolNotFound`.
    async fn get_body(&self, path: &str, symbol: &str) -> Result<String, FeedError> {
        let url = format!("{}{}?symbol={}", self.config.base_url, path, symbol);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            return Err(FeedError::SymbolNotFound(symbol.to_string()));
        }
        if !status.is_success() {
            return Err(FeedError::HttpStatus(status.as_u16()));
        }

        Ok(response.text().await?)
    }

    /// Run `op` up to `max_retries` times while it fails transiently.
    async fn with_retries<F, Fut>(&self, what: &str, op: F) -> Result<f64, FeedError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<f64, FeedError>>,
    {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = FeedError::Abandoned;

        for attempt in 1..=attempts {
            match op().await {
                Ok(price) => return Ok(price),
                Err(e) => {
                    debug!(what, attempt, error = %e, "Binance request failed");
                    let retry = e.is_transient() && attempt < attempts;
                    let delay = e.suggested_retry_delay(self.config.retry_delay);
                    last_error = e;
                    if !retry {
                        break;
                    }
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error)
    }

    /// Mid price of a directly listed symbol.
    async fn book_ticker_mid(&self, symbol: &str) -> Result<f64, FeedError> {
        self.with_retries(symbol, || async move {
            let body = self.get_body("/api/v3/ticker/bookTicker", symbol).await?;
            parse_book_ticker_mid(&body)
        })
        .await
    }

    /// Last trade price of a directly listed symbol.
    async fn ticker_price(&self, symbol: &str) -> Result<f64, FeedError> {
        self.with_retries(symbol, || async move {
            let body = self.get_body("/api/v3/ticker/price", symbol).await?;
            parse_ticker_price(&body)
        })
        .await
    }

    /// Derive base/quote from base/USDT and quote/USDT, fetched concurrently.
    async fn usdt_cross(&self, base: &str, quote: &str) -> Result<f64, FeedError> {
        let base_symbol = symbol(base, CROSS_QUOTE);
        let quote_symbol = symbol(quote, CROSS_QUOTE);

        let (base_usdt, quote_usdt) = try_join(
            self.ticker_price(&base_symbol),
            self.ticker_price(&quote_symbol),
        )
        .await?;

        let price = positive_price(base_usdt / quote_usdt)?;
        debug!(base, quote, price, "Derived price via USDT cross");
        Ok(price)
    }
}

#[async_trait]
impl PriceOracle for BinanceOracle {
    async fn fetch(&self, base: &str, quote: &str) -> Result<f64, FeedError> {
        let symbol = symbol(base, quote);

        let direct_error = match self.book_ticker_mid(&symbol).await {
            Ok(price) => return Ok(price),
            Err(e) => e,
        };

        if quote.eq_ignore_ascii_case(CROSS_QUOTE) || base.eq_ignore_ascii_case(CROSS_QUOTE) {
            warn!(symbol = %symbol, error = %direct_error, "Failed to fetch price");
            return Err(direct_error);
        }

        debug!(symbol = %symbol, error = %direct_error, "Direct price unavailable, trying USDT cross");
        self.usdt_cross(base, quote).await.map_err(|e| {
            warn!(symbol = %symbol, error = %e, "Failed to derive price");
            e
        })
    }
}
