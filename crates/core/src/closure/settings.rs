//! Engine settings: functional currency, tax rate and closing accounts.

use closure_shared::ClosureSettingsConfig;
use rust_decimal::Decimal;

use super::error::ClosureError;

/// Accounts the closure postings use. Defaults follow the Romanian chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMap {
    /// Depreciation expense, used when a schedule line names none.
    pub depreciation_expense: String,
    /// Unrealised FX losses.
    pub fx_loss: String,
    /// Unrealised FX gains.
    pub fx_gain: String,
    /// VAT collected.
    pub vat_collected: String,
    /// VAT deductible.
    pub vat_deductible: String,
    /// VAT payable.
    pub vat_payable: String,
    /// VAT receivable.
    pub vat_receivable: String,
    /// Profit and loss.
    pub profit_and_loss: String,
    /// Profit tax expense.
    pub profit_tax_expense: String,
    /// Profit tax payable.
    pub profit_tax_payable: String,
    /// Legal reserve.
    pub legal_reserve: String,
    /// Statutory reserves.
    pub statutory_reserves: String,
    /// Other reserves.
    pub other_reserves: String,
    /// Dividends payable.
    pub dividends_payable: String,
    /// Retained earnings / carried-forward result.
    pub retained_earnings: String,
}

impl Default for AccountMap {
    fn default() -> Self {
        Self {
            depreciation_expense: "6811".into(),
            fx_loss: "665".into(),
            fx_gain: "765".into(),
            vat_collected: "4427".into(),
            vat_deductible: "4426".into(),
            vat_payable: "4423".into(),
            vat_receivable: "4424".into(),
            profit_and_loss: "121".into(),
            profit_tax_expense: "691".into(),
            profit_tax_payable: "4411".into(),
            legal_reserve: "1061".into(),
            statutory_reserves: "1063".into(),
            other_reserves: "1068".into(),
            dividends_payable: "457".into(),
            retained_earnings: "117".into(),
        }
    }
}

impl AccountMap {
    fn slot(&mut self, purpose: &str) -> Option<&mut String> {
        let slot = match purpose {
            "depreciation_expense" => &mut self.depreciation_expense,
            "fx_loss" => &mut self.fx_loss,
            "fx_gain" => &mut self.fx_gain,
            "vat_collected" => &mut self.vat_collected,
            "vat_deductible" => &mut self.vat_deductible,
            "vat_payable" => &mut self.vat_payable,
            "vat_receivable" => &mut self.vat_receivable,
            "profit_and_loss" => &mut self.profit_and_loss,
            "profit_tax_expense" => &mut self.profit_tax_expense,
            "profit_tax_payable" => &mut self.profit_tax_payable,
            "legal_reserve" => &mut self.legal_reserve,
            "statutory_reserves" => &mut self.statutory_reserves,
            "other_reserves" => &mut self.other_reserves,
            "dividends_payable" => &mut self.dividends_payable,
            "retained_earnings" => &mut self.retained_earnings,
            _ => return None,
        };
        Some(slot)
    }

    /// Applies `purpose -> account code` overrides.
    pub fn with_overrides<'a>(
        mut self,
        overrides: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> Result<Self, ClosureError> {
        for (purpose, code) in overrides {
            if code.trim().is_empty() {
                return Err(ClosureError::InvalidOptions(format!(
                    "account override {purpose} is empty"
                )));
            }
            let slot = self.slot(purpose).ok_or_else(|| {
                ClosureError::InvalidOptions(format!("unknown account purpose {purpose}"))
            })?;
            *slot = code.trim().to_string();
        }
        Ok(self)
    }
}

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureSettings {
    /// Functional currency; balances in it are never revalued.
    pub functional_currency: String,
    /// Corporate income tax rate.
    pub profit_tax_rate: Decimal,
    /// Closing accounts.
    pub accounts: AccountMap,
}

impl Default for ClosureSettings {
    fn default() -> Self {
        Self {
            functional_currency: "RON".into(),
            profit_tax_rate: Decimal::new(16, 2),
            accounts: AccountMap::default(),
        }
    }
}

impl ClosureSettings {
    /// Builds settings from the `closure` configuration section.
    pub fn from_config(config: &ClosureSettingsConfig) -> Result<Self, ClosureError> {
        if config.profit_tax_rate < Decimal::ZERO || config.profit_tax_rate > Decimal::ONE {
            return Err(ClosureError::InvalidOptions(format!(
                "profit tax rate must be between 0 and 1, got {}",
                config.profit_tax_rate
            )));
        }
        Ok(Self {
            functional_currency: config.functional_currency.to_uppercase(),
            profit_tax_rate: config.profit_tax_rate,
            accounts: AccountMap::default().with_overrides(&config.accounts)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_match_config_defaults() {
        let settings = ClosureSettings::from_config(&ClosureSettingsConfig::default()).unwrap();
        assert_eq!(settings, ClosureSettings::default());
        assert_eq!(settings.profit_tax_rate, dec!(0.16));
        assert_eq!(settings.accounts.profit_and_loss, "121");
    }

    #[test]
    fn test_account_override() {
        let mut config = ClosureSettingsConfig::default();
        config.accounts.insert("fx_gain".into(), "7651".into());
        let settings = ClosureSettings::from_config(&config).unwrap();
        assert_eq!(settings.accounts.fx_gain, "7651");
        assert_eq!(settings.accounts.fx_loss, "665");
    }

    #[test]
    fn test_unknown_override_rejected() {
        let mut config = ClosureSettingsConfig::default();
        config.accounts.insert("bonus_pool".into(), "4287".into());
        assert!(ClosureSettings::from_config(&config).is_err());
    }

    #[test]
    fn test_rate_out_of_range_rejected() {
        let config = ClosureSettingsConfig {
            profit_tax_rate: dec!(1.5),
            ..ClosureSettingsConfig::default()
        };
        assert!(ClosureSettings::from_config(&config).is_err());
    }
}
