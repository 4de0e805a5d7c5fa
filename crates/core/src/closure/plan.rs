//! The closure protocol as data: ordered step descriptors per period type.
//!
//! Order is part of the protocol. Tax reads the accounting profit of P&L
//! closure, distribution reads the net profit of tax, and the lock is last.

use super::options::ClosureOptions;
use super::steps::{
    DepreciationCalculator, FxRevaluationEngine, ProfitAndLossClosure, ProfitDistributionEngine,
    ProfitTaxCalculator, StepExecutor, VatSettlementEngine,
};
use super::types::StepId;
use crate::fiscal::PeriodKind;

/// What running a step means.
#[derive(Clone, Copy)]
pub enum StepAction {
    /// Compute with an executor, then post in commit runs.
    Execute(&'static dyn StepExecutor),
    /// Lock the period.
    LockPeriod,
}

/// One entry of a step plan.
#[derive(Clone, Copy)]
pub struct StepDescriptor {
    /// Step identifier.
    pub id: StepId,
    /// What the step does.
    pub action: StepAction,
    /// Whether the request asks to skip the step.
    pub skip: fn(&ClosureOptions) -> bool,
}

impl std::fmt::Debug for StepDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepDescriptor").field("id", &self.id).finish_non_exhaustive()
    }
}

fn never(_: &ClosureOptions) -> bool {
    false
}

fn skip_depreciation(options: &ClosureOptions) -> bool {
    options.monthly().skip_depreciation
}

fn skip_fx_revaluation(options: &ClosureOptions) -> bool {
    options.monthly().skip_fx_revaluation
}

fn skip_vat(options: &ClosureOptions) -> bool {
    options.monthly().skip_vat
}

/// Monthly closure: depreciation, FX revaluation, VAT settlement, lock.
pub static MONTHLY_STEPS: [StepDescriptor; 4] = [
    StepDescriptor {
        id: StepId::Depreciation,
        action: StepAction::Execute(&DepreciationCalculator),
        skip: skip_depreciation,
    },
    StepDescriptor {
        id: StepId::FxRevaluation,
        action: StepAction::Execute(&FxRevaluationEngine),
        skip: skip_fx_revaluation,
    },
    StepDescriptor {
        id: StepId::VatSettlement,
        action: StepAction::Execute(&VatSettlementEngine),
        skip: skip_vat,
    },
    StepDescriptor {
        id: StepId::PeriodLock,
        action: StepAction::LockPeriod,
        skip: never,
    },
];

/// Annual closure: P&L closure, profit tax, profit distribution, lock.
pub static ANNUAL_STEPS: [StepDescriptor; 4] = [
    StepDescriptor {
        id: StepId::ProfitAndLoss,
        action: StepAction::Execute(&ProfitAndLossClosure),
        skip: never,
    },
    StepDescriptor {
        id: StepId::ProfitTax,
        action: StepAction::Execute(&ProfitTaxCalculator),
        skip: never,
    },
    StepDescriptor {
        id: StepId::ProfitDistribution,
        action: StepAction::Execute(&ProfitDistributionEngine),
        skip: never,
    },
    StepDescriptor {
        id: StepId::PeriodLock,
        action: StepAction::LockPeriod,
        skip: never,
    },
];

/// Step plan of a period type.
#[must_use]
pub fn steps_for(kind: PeriodKind) -> &'static [StepDescriptor] {
    match kind {
        PeriodKind::Monthly => &MONTHLY_STEPS,
        PeriodKind::Annual => &ANNUAL_STEPS,
    }
}
