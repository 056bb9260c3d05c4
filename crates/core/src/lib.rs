//! Core data types for the price watch bot.

pub mod asset;
pub mod error;
pub mod pair;
pub mod price;

pub use asset::*;
pub use error::*;
pub use pair::*;
pub use price::*;
