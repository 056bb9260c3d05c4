//! Market price sources.
//!
//! ## Architecture
//!
//! - `oracle` - `PriceOracle` trait consumed by the monitoring engine
//! - `binance` - Binance REST oracle with a USDT-cross fallback derivation
//! - `mock` - scripted oracle for tests and offline runs

pub mod binance;
pub mod error;
pub mod mock;
pub mod oracle;

pub use binance::*;
pub use error::*;
pub use mock::MockOracle;
pub use oracle::*;
