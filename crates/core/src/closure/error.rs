//! Closure error taxonomy.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fiscal::{LockStoreError, PeriodError};
use crate::ledger::LedgerError;

/// Taxonomy class of a [`ClosureError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or out-of-range input.
    Validation,
    /// Commit on a locked period.
    AlreadyLocked,
    /// Another commit for the same period is in flight.
    Conflict,
    /// A step could not produce its figures.
    Calculation,
    /// The ledger refused a posting.
    Posting,
    /// Infrastructure failure.
    Internal,
}

impl ErrorKind {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::AlreadyLocked => "already_locked",
            Self::Conflict => "conflict",
            Self::Calculation => "calculation",
            Self::Posting => "posting",
            Self::Internal => "internal",
        }
    }

    /// HTTP status of a run rejected with this kind of error.
    #[must_use]
    pub const fn http_status_code(self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::AlreadyLocked | Self::Conflict => 409,
            Self::Calculation | Self::Posting => 422,
            Self::Internal => 500,
        }
    }
}

/// Errors raised while running a closure.
#[derive(Debug, Clone, Error)]
pub enum ClosureError {
    // ========== Validation Errors ==========
    /// Period coordinates out of range.
    #[error("Invalid period: {0}")]
    InvalidPeriod(#[from] PeriodError),

    /// Options do not match the period type.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// A monetary input is negative.
    #[error("{field} must not be negative, got {value}")]
    NegativeInput {
        /// Input field name.
        field: &'static str,
        /// Offending value.
        value: Decimal,
    },

    /// Allocations exceed the profit available for distribution.
    #[error("Profit distribution of {requested} exceeds net profit of {net_profit}")]
    DistributionExceedsProfit {
        /// Sum of the four allocations.
        requested: Decimal,
        /// Net profit of the year.
        net_profit: Decimal,
    },

    // ========== State Errors ==========
    /// The period is already locked.
    #[error("Fiscal period {0} is already locked")]
    AlreadyLocked(String),

    /// A commit run for the period is already executing.
    #[error("A closure run for {0} is already in progress")]
    RunInProgress(String),

    // ========== Calculation Errors ==========
    /// No closing rate for a currency on the period end date.
    #[error("No exchange rate for {currency} on {date}")]
    NoExchangeRate {
        /// Currency code.
        currency: String,
        /// Requested date.
        date: NaiveDate,
    },

    /// The asset register scheduled a negative amount.
    #[error("Scheduled depreciation for asset {asset} is negative: {amount}")]
    NegativeDepreciation {
        /// Asset name or id.
        asset: String,
        /// Scheduled amount.
        amount: Decimal,
    },

    /// Any other computation failure.
    #[error("Calculation failed: {0}")]
    Calculation(String),

    /// A data source failed while a step was reading from it.
    #[error("{name} unavailable: {message}")]
    Source {
        /// Collaborator name.
        name: &'static str,
        /// Underlying failure.
        message: String,
    },

    /// A step emitted a malformed journal posting.
    #[error("Invalid posting: {0}")]
    InvalidPosting(LedgerError),

    // ========== Posting Errors ==========
    /// The ledger refused a posting.
    #[error("Posting failed: {0}")]
    Posting(#[from] LedgerError),

    // ========== Infrastructure Errors ==========
    /// Lock or run store failure.
    #[error("Store error: {0}")]
    Store(String),
}

impl From<LockStoreError> for ClosureError {
    fn from(err: LockStoreError) -> Self {
        Self::Store(err.0)
    }
}

impl ClosureError {
    /// Taxonomy class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPeriod(_)
            | Self::InvalidOptions(_)
            | Self::NegativeInput { .. }
            | Self::DistributionExceedsProfit { .. } => ErrorKind::Validation,
            Self::AlreadyLocked(_) => ErrorKind::AlreadyLocked,
            Self::RunInProgress(_) => ErrorKind::Conflict,
            Self::NoExchangeRate { .. }
            | Self::NegativeDepreciation { .. }
            | Self::Calculation(_)
            | Self::InvalidPosting(_)
            | Self::Source { .. } => ErrorKind::Calculation,
            Self::Posting(_) => ErrorKind::Posting,
            Self::Store(_) => ErrorKind::Internal,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidPeriod(_) => "INVALID_PERIOD",
            Self::InvalidOptions(_) => "INVALID_OPTIONS",
            Self::NegativeInput { .. } => "NEGATIVE_INPUT",
            Self::DistributionExceedsProfit { .. } => "DISTRIBUTION_EXCEEDS_PROFIT",
            Self::AlreadyLocked(_) => "PERIOD_ALREADY_LOCKED",
            Self::RunInProgress(_) => "RUN_IN_PROGRESS",
            Self::NoExchangeRate { .. } => "NO_EXCHANGE_RATE",
            Self::NegativeDepreciation { .. } => "NEGATIVE_DEPRECIATION",
            Self::Calculation(_) => "CALCULATION_ERROR",
            Self::Source { .. } => "SOURCE_UNAVAILABLE",
            Self::InvalidPosting(_) => "INVALID_POSTING",
            Self::Posting(inner) => inner.error_code(),
            Self::Store(_) => "STORE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error when it rejects a run.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        self.kind().http_status_code()
    }

    /// Wraps a collaborator failure.
    pub fn unavailable(name: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Source {
            name,
            message: err.to_string(),
        }
    }
}
