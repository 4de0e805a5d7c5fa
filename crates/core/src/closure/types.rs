//! Closure run state model.

use std::fmt;

use chrono::{DateTime, Utc};
use closure_shared::types::{ClosureRunId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::{ClosureError, ErrorKind};
use super::options::{ClosureOptions, ClosureRequest};
use super::steps::StepFigures;
use crate::fiscal::PeriodKey;
use crate::ledger::{JournalPosting, PostingReference};

/// Stable identifier of a closure step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepId {
    /// Monthly depreciation of fixed assets.
    #[serde(rename = "depreciation")]
    Depreciation,
    /// Monthly revaluation of foreign-currency balances.
    #[serde(rename = "fx")]
    FxRevaluation,
    /// Monthly VAT settlement.
    #[serde(rename = "vat")]
    VatSettlement,
    /// Year-end closing of revenue and expense accounts.
    #[serde(rename = "pl")]
    ProfitAndLoss,
    /// Corporate income tax.
    #[serde(rename = "tax")]
    ProfitTax,
    /// Allocation of net profit.
    #[serde(rename = "dist")]
    ProfitDistribution,
    /// Period lock, always last.
    #[serde(rename = "lock")]
    PeriodLock,
}

impl StepId {
    /// Steps whose postings close the year into equity.
    pub const YEAR_END_CLOSING: [Self; 3] =
        [Self::ProfitAndLoss, Self::ProfitTax, Self::ProfitDistribution];

    /// Wire identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Depreciation => "depreciation",
            Self::FxRevaluation => "fx",
            Self::VatSettlement => "vat",
            Self::ProfitAndLoss => "pl",
            Self::ProfitTax => "tax",
            Self::ProfitDistribution => "dist",
            Self::PeriodLock => "lock",
        }
    }

    /// Source tag stamped on postings emitted by the step.
    #[must_use]
    pub fn posting_source(self) -> String {
        format!("closure:{}", self.as_str())
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step lifecycle: `pending` then `running` then one of the terminal states.
/// Steps left behind by a halted run stay `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Not started.
    Pending,
    /// Executing.
    Running,
    /// Completed.
    Success,
    /// Failed; the run halted here.
    Error,
    /// Not executed by request.
    Skipped,
}

impl StepStatus {
    /// Returns true for `success`, `error` and `skipped`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Skipped)
    }
}

/// Whether a run may produce durable effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Compute everything, post and lock nothing.
    DryRun,
    /// Post to the ledger and lock the period.
    Commit,
}

impl RunMode {
    /// Mode from the HTTP `dryRun` flag.
    #[must_use]
    pub const fn from_dry_run(dry_run: bool) -> Self {
        if dry_run { Self::DryRun } else { Self::Commit }
    }

    /// Returns true for commit runs.
    #[must_use]
    pub const fn is_commit(self) -> bool {
        matches!(self, Self::Commit)
    }
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every step succeeded or was skipped.
    Success,
    /// Halted after earlier steps had already committed postings.
    PartialFailure,
    /// Rejected before execution, or halted with no durable effect.
    Failed,
}

/// Error detail recorded against a step or a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunError {
    /// Step that produced the error, `None` for pre-flight rejections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<StepId>,
    /// Taxonomy class.
    pub kind: ErrorKind,
    /// SCREAMING_SNAKE error code.
    pub code: String,
    /// Human readable message.
    pub message: String,
}

impl RunError {
    /// Captures a closure error.
    #[must_use]
    pub fn from_error(step: Option<StepId>, error: &ClosureError) -> Self {
        Self {
            step,
            kind: error.kind(),
            code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }
}

/// One step of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosureStep {
    /// Which step.
    pub step_id: StepId,
    /// Current status.
    pub status: StepStatus,
    /// Computed figures, present once the step succeeded.
    pub result: Option<StepFigures>,
    /// Ledger entries accepted for this step (commit runs only).
    pub postings: Vec<PostingReference>,
    /// Journal entries the step computed: proposed in a dry run, submitted in a commit.
    pub journal_entries: Vec<JournalPosting>,
    /// Non-fatal observations.
    pub warnings: Vec<String>,
    /// Failure detail.
    pub error: Option<RunError>,
    /// Execution start.
    pub started_at: Option<DateTime<Utc>>,
    /// Execution end.
    pub finished_at: Option<DateTime<Utc>>,
}

impl ClosureStep {
    /// A step that has not started.
    #[must_use]
    pub const fn pending(step_id: StepId) -> Self {
        Self {
            step_id,
            status: StepStatus::Pending,
            result: None,
            postings: Vec::new(),
            journal_entries: Vec::new(),
            warnings: Vec::new(),
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Returns true if the step ran (successfully or not).
    #[must_use]
    pub const fn was_executed(&self) -> bool {
        matches!(self.status, StepStatus::Success | StepStatus::Error)
    }
}

/// Computed profit tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitTaxComputation {
    /// Profit before tax adjustments.
    pub accounting_profit: Decimal,
    /// Adjusted profit, floored at zero.
    pub taxable_profit: Decimal,
    /// Rate applied.
    pub tax_rate: Decimal,
    /// taxableProfit x rate.
    pub profit_tax_amount: Decimal,
    /// accountingProfit - profitTaxAmount.
    pub net_profit: Decimal,
}

/// Allocation of net profit, with retained earnings derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitDistribution {
    /// Legal reserve (1061).
    pub legal_reserve: Decimal,
    /// Statutory reserves (1063).
    pub statutory_reserves: Decimal,
    /// Other reserves (1068).
    pub other_reserves: Decimal,
    /// Dividends (457).
    pub dividends: Decimal,
    /// netProfit minus the four allocations (117).
    pub retained_earnings: Decimal,
}

/// Year-end figures of an annual run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearEndResult {
    /// Class 7 turnover.
    pub total_revenue: Decimal,
    /// Class 6 turnover.
    pub total_expenses: Decimal,
    /// totalRevenue - totalExpenses.
    pub accounting_profit: Decimal,
    /// Adjusted profit the tax rate applies to.
    pub taxable_profit: Decimal,
    /// Corporate income tax.
    pub profit_tax_amount: Decimal,
    /// accountingProfit - profitTaxAmount.
    pub net_profit: Decimal,
    /// Distribution, when that step ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<ProfitDistribution>,
}

/// One closure attempt. Immutable once `finished_at` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosureRun {
    /// Run identifier.
    pub id: ClosureRunId,
    /// Target period.
    pub period: PeriodKey,
    /// Dry run or commit.
    pub mode: RunMode,
    /// Options as requested.
    pub options: ClosureOptions,
    /// Requesting user.
    pub requested_by: Option<UserId>,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end.
    pub finished_at: Option<DateTime<Utc>>,
    /// Overall outcome.
    pub status: RunStatus,
    /// Steps in protocol order.
    pub steps: Vec<ClosureStep>,
    /// Run-level warnings (step warnings live on their steps).
    pub warnings: Vec<String>,
    /// Errors; the first one is fatal.
    pub errors: Vec<RunError>,
    /// Year-end figures of annual runs.
    pub year_end_result: Option<YearEndResult>,
}

impl ClosureRun {
    /// A run whose steps are all pending.
    #[must_use]
    pub fn start(
        id: ClosureRunId,
        request: &ClosureRequest,
        steps: impl IntoIterator<Item = StepId>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            period: request.period,
            mode: request.mode,
            options: request.options.clone(),
            requested_by: request.requested_by,
            started_at,
            finished_at: None,
            status: RunStatus::Failed,
            steps: steps.into_iter().map(ClosureStep::pending).collect(),
            warnings: Vec::new(),
            errors: Vec::new(),
            year_end_result: None,
        }
    }

    /// The step with `step_id`.
    #[must_use]
    pub fn step(&self, step_id: StepId) -> Option<&ClosureStep> {
        self.steps.iter().find(|step| step.step_id == step_id)
    }

    /// Number of steps that ran.
    #[must_use]
    pub fn executed_steps(&self) -> usize {
        self.steps.iter().filter(|step| step.was_executed()).count()
    }

    /// Returns true when the run finished with status `success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// The error that halted the run.
    #[must_use]
    pub fn fatal_error(&self) -> Option<&RunError> {
        self.errors.first()
    }
}
