//! Supported coin lists.

use crate::error::{CoreError, CoreResult};

/// Base coins offered for tracking.
pub const BASE_COINS: &[&str] = &[
    "BTC", "ETH", "SOL", "BNB", "XRP", "ADA", "DOGE", "DOT", "MATIC", "AVAX", "LINK", "UNI", "LTC",
    "ATOM", "NEAR", "ALGO", "VET", "ICP", "FIL", "TRX", "ETC", "XLM", "BCH", "APT", "ARB", "OP",
    "SUI", "SEI", "INJ", "TIA", "BTS",
];

/// Quote coins offered for tracking.
pub const QUOTE_COINS: &[&str] = &[
    "USDT", "BTC", "ETH", "BNB", "USDC", "BUSD", "DAI", "TUSD", "USDP", "SOL",
];

/// Check that a pair is made of listed coins and is not a self-pair.
pub fn validate_pair(base: &str, quote: &str) -> CoreResult<()> {
    let listed_base = BASE_COINS.iter().any(|c| c.eq_ignore_ascii_case(base));
    let listed_quote = QUOTE_COINS.iter().any(|c| c.eq_ignore_ascii_case(quote));

    if !listed_base || !listed_quote || base.eq_ignore_ascii_case(quote) {
        return Err(CoreError::UnsupportedPair {
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
        });
    }
    Ok(())
}
