//! Currency arithmetic with Banker's Rounding.

use rust_decimal::Decimal;
use rust_decimal::prelude::*;

/// Decimal places of posted monetary amounts.
pub const MONEY_DECIMALS: u32 = 2;

/// Rounding and conversion helpers.
///
/// All rounding uses `RoundingStrategy::MidpointNearestEven` (Banker's Rounding):
/// 2.345 rounds to 2.34, 2.355 rounds to 2.36.
pub struct CurrencyService;

impl CurrencyService {
    /// Converts a foreign amount at `rate` and rounds to posting precision.
    ///
    /// ```
    /// use rust_decimal_macros::dec;
    /// use closure_core::currency::CurrencyService;
    ///
    /// assert_eq!(CurrencyService::convert(dec!(1000), dec!(4.9763)), dec!(4976.30));
    /// ```
    #[must_use]
    pub fn convert(amount: Decimal, rate: Decimal) -> Decimal {
        Self::round_money(amount * rate)
    }

    /// Rounds to posting precision.
    #[must_use]
    pub fn round_money(value: Decimal) -> Decimal {
        Self::round(value, MONEY_DECIMALS)
    }

    /// Rounds to `decimal_places`.
    #[must_use]
    pub fn round(value: Decimal, decimal_places: u32) -> Decimal {
        value.round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointNearestEven)
    }
}
