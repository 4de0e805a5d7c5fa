//! Fiscal period closure engine.
//!
//! A monthly closure runs depreciation, FX revaluation, VAT settlement and
//! the period lock. An annual closure closes profit and loss, computes profit
//! tax, distributes net profit and locks the year. Each run is either a dry
//! run (figures and journal entries only) or a commit (entries posted,
//! period locked).
//!
//! [`ClosureOrchestrator`] drives a run; [`ClosureReport`] is the shape
//! returned to callers.

pub mod error;
pub mod lock;
#[cfg(any(test, feature = "in-memory"))]
pub mod memory;
pub mod options;
pub mod orchestrator;
pub mod plan;
pub mod report;
pub mod settings;
pub mod sources;
pub mod steps;
pub mod types;

#[cfg(test)]
mod scenarios;

pub use error::{ClosureError, ErrorKind};
pub use lock::{LockFigures, PeriodLockManager};
pub use options::{
    AnnualOptions, ClosureOptions, ClosureRequest, DistributionRequest, MonthlyOptions,
    TaxAdjustments,
};
pub use orchestrator::{ClosureOrchestrator, InFlightRuns};
pub use report::{ClosureReport, ClosureReportData, ReportedError, ReportedWarning, StepReport};
pub use settings::{AccountMap, ClosureSettings};
pub use sources::{
    ClosureRunStore, ClosureSources, DepreciationLine, ExchangeRateSource, FixedAssetRegister,
    ForeignCurrencyBalance, ForeignCurrencyLedger, RunFilter, SourceError, VatCadence,
    VatSettings, VatSettingsProvider,
};
pub use steps::{StepExecutor, StepFigures};
pub use types::{
    ClosureRun, ClosureStep, ProfitDistribution, ProfitTaxComputation, RunError, RunMode,
    RunStatus, StepId, StepStatus, YearEndResult,
};
