//! Price parsing and display helpers.

use crate::error::{CoreError, CoreResult};

/// Parse a user supplied price bound.
///
/// `-` means "no bound". Accepts `,` as the decimal separator.
pub fn parse_price_input(input: &str) -> CoreResult<Option<f64>> {
    let input = input.trim();
    if input == "-" {
        return Ok(None);
    }

    let normalized = input.replace(',', ".");
    let price: f64 = normalized
        .parse()
        .map_err(|_| CoreError::InvalidNumber(input.to_string()))?;

    if !price.is_finite() {
        return Err(CoreError::InvalidNumber(input.to_string()));
    }
    if price <= 0.0 {
        return Err(CoreError::NonPositivePrice(price));
    }

    Ok(Some(price))
}

/// Format price with precision based on magnitude.
pub fn format_price(price: f64) -> String {
    let abs_price = price.abs();
    if abs_price >= 1000.0 {
        format!("{:.2}", price)
    } else if abs_price >= 1.0 {
        format!("{:.4}", price)
    } else {
        format!("{:.8}", price)
    }
}
