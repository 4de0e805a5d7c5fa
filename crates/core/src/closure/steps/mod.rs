//! Step executors.
//!
//! Each executor computes figures and the journal postings that realise them
//! for one closure activity. Executors know nothing about ordering, skipping
//! or run mode: they never post and never lock. The orchestrator decides what
//! happens to their output.

pub mod depreciation;
pub mod fx_revaluation;
pub mod profit_and_loss;
pub mod profit_distribution;
pub mod profit_tax;
pub mod vat_settlement;

use async_trait::async_trait;
use closure_shared::types::ClosureRunId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use depreciation::{DepreciationCalculator, DepreciationFigures};
pub use fx_revaluation::{FxRevaluationEngine, FxRevaluationFigures};
pub use profit_and_loss::{ProfitAndLossClosure, ProfitAndLossFigures};
pub use profit_distribution::{ProfitDistributionEngine, distribute};
pub use profit_tax::{ProfitTaxCalculator, compute_profit_tax};
pub use vat_settlement::{VatSettlementEngine, VatSettlementFigures};

use super::error::ClosureError;
use super::lock::LockFigures;
use super::options::ClosureRequest;
use super::settings::ClosureSettings;
use super::sources::ClosureSources;
use super::types::{ProfitDistribution, ProfitTaxComputation, StepId, YearEndResult};
use crate::ledger::{JournalLine, JournalPosting};

/// Figures computed by a step, tagged by step type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepFigures {
    /// Depreciation totals.
    Depreciation(DepreciationFigures),
    /// FX revaluation deltas.
    FxRevaluation(FxRevaluationFigures),
    /// VAT position.
    VatSettlement(VatSettlementFigures),
    /// Revenue, expenses and accounting profit.
    ProfitAndLoss(ProfitAndLossFigures),
    /// Profit tax.
    ProfitTax(ProfitTaxComputation),
    /// Profit allocation.
    ProfitDistribution(ProfitDistribution),
    /// Lock state.
    PeriodLock(LockFigures),
}

/// Figures accumulated by earlier steps of the same run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClosureContext {
    profit_and_loss: Option<ProfitAndLossFigures>,
    profit_tax: Option<ProfitTaxComputation>,
    distribution: Option<ProfitDistribution>,
}

impl ClosureContext {
    /// Keeps the figures later steps depend on.
    pub fn record(&mut self, figures: &StepFigures) {
        match figures {
            StepFigures::ProfitAndLoss(pl) => self.profit_and_loss = Some(pl.clone()),
            StepFigures::ProfitTax(tax) => self.profit_tax = Some(*tax),
            StepFigures::ProfitDistribution(distribution) => {
                self.distribution = Some(*distribution);
            }
            StepFigures::Depreciation(_)
            | StepFigures::FxRevaluation(_)
            | StepFigures::VatSettlement(_)
            | StepFigures::PeriodLock(_) => {}
        }
    }

    /// P&L figures, if that step ran.
    #[must_use]
    pub const fn profit_and_loss(&self) -> Option<&ProfitAndLossFigures> {
        self.profit_and_loss.as_ref()
    }

    /// Accounting profit, zero until P&L closure ran.
    #[must_use]
    pub fn accounting_profit(&self) -> Decimal {
        self.profit_and_loss
            .as_ref()
            .map_or(Decimal::ZERO, |pl| pl.accounting_profit)
    }

    /// Net profit after tax, the accounting profit until tax was computed.
    #[must_use]
    pub fn net_profit(&self) -> Decimal {
        self.profit_tax
            .map_or_else(|| self.accounting_profit(), |tax| tax.net_profit)
    }

    /// Year-end figures, once P&L closure ran.
    #[must_use]
    pub fn year_end_result(&self) -> Option<YearEndResult> {
        let pl = self.profit_and_loss.as_ref()?;
        let tax = self.profit_tax;
        Some(YearEndResult {
            total_revenue: pl.total_revenue,
            total_expenses: pl.total_expenses,
            accounting_profit: pl.accounting_profit,
            taxable_profit: tax.map_or(Decimal::ZERO, |tax| tax.taxable_profit),
            profit_tax_amount: tax.map_or(Decimal::ZERO, |tax| tax.profit_tax_amount),
            net_profit: self.net_profit(),
            distribution: self.distribution,
        })
    }
}

/// Everything a step may read.
#[derive(Clone, Copy)]
pub struct StepInput<'a> {
    /// The frozen request.
    pub request: &'a ClosureRequest,
    /// Run the postings belong to.
    pub run_id: ClosureRunId,
    /// Engine settings.
    pub settings: &'a ClosureSettings,
    /// Data sources.
    pub sources: &'a ClosureSources,
    /// Figures of earlier steps.
    pub context: &'a ClosureContext,
}

impl StepInput<'_> {
    /// Month of a monthly run.
    pub fn month(&self) -> Result<u32, ClosureError> {
        self.request.period.month.ok_or_else(|| {
            ClosureError::InvalidOptions(format!(
                "monthly step requested for annual period {}",
                self.request.period
            ))
        })
    }

    /// A posting of `step` dated on the last day of the period.
    pub fn posting(
        &self,
        step: StepId,
        description: impl Into<String>,
        lines: Vec<JournalLine>,
    ) -> Result<JournalPosting, ClosureError> {
        let period = self.request.period;
        Ok(JournalPosting {
            company_id: period.company_id,
            period,
            entry_date: period.end_date()?,
            source: step.posting_source(),
            description: description.into(),
            closure_run_id: self.run_id,
            lines,
        })
    }
}

/// What a step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    /// Computed figures.
    pub figures: StepFigures,
    /// Postings to submit in a commit run.
    pub postings: Vec<JournalPosting>,
    /// Non-fatal observations.
    pub warnings: Vec<String>,
}

impl StepOutput {
    /// Output with figures only.
    #[must_use]
    pub const fn new(figures: StepFigures) -> Self {
        Self {
            figures,
            postings: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Adds a posting.
    #[must_use]
    pub fn with_posting(mut self, posting: JournalPosting) -> Self {
        self.postings.push(posting);
        self
    }

    /// Adds a warning.
    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// One closure activity.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Computes figures and postings. Must not have side effects.
    async fn execute(&self, input: &StepInput<'_>) -> Result<StepOutput, ClosureError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pl(revenue: Decimal, expenses: Decimal) -> StepFigures {
        StepFigures::ProfitAndLoss(ProfitAndLossFigures {
            total_revenue: revenue,
            total_expenses: expenses,
            accounting_profit: revenue - expenses,
            accounts_closed: 2,
        })
    }

    #[test]
    fn test_empty_context_defaults_to_zero() {
        let context = ClosureContext::default();
        assert_eq!(context.accounting_profit(), Decimal::ZERO);
        assert_eq!(context.net_profit(), Decimal::ZERO);
        assert!(context.year_end_result().is_none());
    }

    #[test]
    fn test_context_threads_profit_into_net_profit() {
        let mut context = ClosureContext::default();
        context.record(&pl(dec!(500000), dec!(350000)));
        assert_eq!(context.net_profit(), dec!(150000));

        context.record(&StepFigures::ProfitTax(ProfitTaxComputation {
            accounting_profit: dec!(150000),
            taxable_profit: dec!(160000),
            tax_rate: dec!(0.16),
            profit_tax_amount: dec!(25600),
            net_profit: dec!(124400),
        }));

        let result = context.year_end_result().unwrap();
        assert_eq!(result.accounting_profit, dec!(150000));
        assert_eq!(result.taxable_profit, dec!(160000));
        assert_eq!(result.profit_tax_amount, dec!(25600));
        assert_eq!(result.net_profit, dec!(124400));
        assert!(result.distribution.is_none());
    }
}
