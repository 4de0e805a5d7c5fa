//! Immutable per-run request and options.
//!
//! A [`ClosureRequest`] is built once per invocation and shared by reference
//! with every step; nothing mutates it during a run.

use closure_shared::types::UserId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::ClosureError;
use super::types::RunMode;
use crate::fiscal::{PeriodKey, PeriodKind};

/// Skip flags of a monthly run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyOptions {
    /// Do not run depreciation.
    pub skip_depreciation: bool,
    /// Do not run FX revaluation.
    pub skip_fx_revaluation: bool,
    /// Do not run VAT settlement.
    pub skip_vat: bool,
}

/// Corporate tax adjustments, all non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaxAdjustments {
    /// Expenses not deductible for tax.
    pub non_deductible_expenses: Decimal,
    /// Income exempt from tax.
    pub non_taxable_income: Decimal,
    /// Prior-year fiscal loss recovered this year.
    pub tax_loss_carryforward: Decimal,
    /// Other deductions.
    pub other_adjustments: Decimal,
}

impl TaxAdjustments {
    fn fields(&self) -> [(&'static str, Decimal); 4] {
        [
            ("nonDeductibleExpenses", self.non_deductible_expenses),
            ("nonTaxableIncome", self.non_taxable_income),
            ("taxLossCarryforward", self.tax_loss_carryforward),
            ("otherAdjustments", self.other_adjustments),
        ]
    }

    /// Rejects negative inputs.
    pub fn validate(&self) -> Result<(), ClosureError> {
        reject_negative(&self.fields())
    }
}

/// Requested allocation of net profit. Retained earnings are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DistributionRequest {
    /// Legal reserve.
    pub legal_reserve: Decimal,
    /// Statutory reserves.
    pub statutory_reserves: Decimal,
    /// Other reserves.
    pub other_reserves: Decimal,
    /// Dividends.
    pub dividends: Decimal,
}

impl DistributionRequest {
    fn fields(&self) -> [(&'static str, Decimal); 4] {
        [
            ("legalReserve", self.legal_reserve),
            ("statutoryReserves", self.statutory_reserves),
            ("otherReserves", self.other_reserves),
            ("dividends", self.dividends),
        ]
    }

    /// Sum of the four allocations.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.legal_reserve + self.statutory_reserves + self.other_reserves + self.dividends
    }

    /// Rejects negative inputs.
    pub fn validate(&self) -> Result<(), ClosureError> {
        reject_negative(&self.fields())
    }
}

fn reject_negative(fields: &[(&'static str, Decimal)]) -> Result<(), ClosureError> {
    match fields.iter().find(|(_, value)| *value < Decimal::ZERO) {
        Some(&(field, value)) => Err(ClosureError::NegativeInput { field, value }),
        None => Ok(()),
    }
}

/// Inputs of an annual run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualOptions {
    /// Tax adjustments.
    pub tax_adjustments: TaxAdjustments,
    /// Profit allocation.
    pub profit_distribution: DistributionRequest,
}

/// Options of a run, matching its period type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClosureOptions {
    /// Monthly run.
    Monthly(MonthlyOptions),
    /// Annual run.
    Annual(AnnualOptions),
}

impl ClosureOptions {
    /// Period type these options apply to.
    #[must_use]
    pub const fn kind(&self) -> PeriodKind {
        match self {
            Self::Monthly(_) => PeriodKind::Monthly,
            Self::Annual(_) => PeriodKind::Annual,
        }
    }

    /// Monthly flags, all false for annual options.
    #[must_use]
    pub fn monthly(&self) -> MonthlyOptions {
        match self {
            Self::Monthly(options) => *options,
            Self::Annual(_) => MonthlyOptions::default(),
        }
    }

    /// Annual inputs, zero for monthly options.
    #[must_use]
    pub fn annual(&self) -> AnnualOptions {
        match self {
            Self::Annual(options) => *options,
            Self::Monthly(_) => AnnualOptions::default(),
        }
    }
}

/// A request to close one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosureRequest {
    /// Target period.
    pub period: PeriodKey,
    /// Dry run or commit.
    pub mode: RunMode,
    /// Skip flags or annual inputs.
    pub options: ClosureOptions,
    /// Requesting user.
    pub requested_by: Option<UserId>,
}

impl ClosureRequest {
    /// Monthly closure request.
    #[must_use]
    pub const fn monthly(period: PeriodKey, mode: RunMode, options: MonthlyOptions) -> Self {
        Self {
            period,
            mode,
            options: ClosureOptions::Monthly(options),
            requested_by: None,
        }
    }

    /// Annual closure request.
    #[must_use]
    pub const fn annual(period: PeriodKey, mode: RunMode, options: AnnualOptions) -> Self {
        Self {
            period,
            mode,
            options: ClosureOptions::Annual(options),
            requested_by: None,
        }
    }

    /// Records the requesting user.
    #[must_use]
    pub const fn requested_by(mut self, user_id: UserId) -> Self {
        self.requested_by = Some(user_id);
        self
    }

    /// Pre-flight input validation.
    pub fn validate(&self) -> Result<(), ClosureError> {
        self.period.validate()?;
        if self.options.kind() != self.period.kind() {
            return Err(ClosureError::InvalidOptions(format!(
                "{:?} options given for {:?} period {}",
                self.options.kind(),
                self.period.kind(),
                self.period
            )));
        }
        if let ClosureOptions::Annual(annual) = &self.options {
            annual.tax_adjustments.validate()?;
            annual.profit_distribution.validate()?;
        }
        Ok(())
    }
}
