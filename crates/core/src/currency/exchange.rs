//! Exchange rate types.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Closing rate of a foreign currency against the functional currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRate {
    /// Foreign currency code, e.g. "EUR".
    pub currency: String,
    /// Functional currency units per one foreign unit.
    pub rate: Decimal,
    /// Date this rate is effective.
    pub effective_date: NaiveDate,
}

impl ExchangeRate {
    /// Creates a new exchange rate.
    #[must_use]
    pub fn new(currency: impl Into<String>, rate: Decimal, effective_date: NaiveDate) -> Self {
        Self {
            currency: currency.into(),
            rate,
            effective_date,
        }
    }

    /// A rate is usable only when strictly positive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.rate > Decimal::ZERO
    }
}
