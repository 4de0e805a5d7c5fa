//! Monetary rounding and exchange rates.

pub mod exchange;
pub mod service;

pub use exchange::ExchangeRate;
pub use service::{CurrencyService, MONEY_DECIMALS};
