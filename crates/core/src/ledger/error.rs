//! Ledger error types for posting validation and gateway failures.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur when validating or submitting a journal posting.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    // ========== Validation Errors ==========
    /// Posting must have at least 2 lines.
    #[error("Posting must have at least 2 lines")]
    InsufficientLines,

    /// Posting is not balanced (debits != credits).
    #[error("Posting is not balanced. Debit: {debit}, Credit: {credit}")]
    UnbalancedPosting {
        /// Total debit amount.
        debit: Decimal,
        /// Total credit amount.
        credit: Decimal,
    },

    /// Line amount cannot be negative.
    #[error("Line amount cannot be negative on account {0}")]
    NegativeAmount(String),

    /// Line must carry either a debit or a credit, not both and not neither.
    #[error("Line on account {0} must carry either a debit or a credit")]
    InvalidEntryType(String),

    /// Line has no account code.
    #[error("Line has no account code")]
    MissingAccount,

    // ========== Ledger Errors ==========
    /// The target period refuses postings.
    #[error("Fiscal period {0} is locked, no posting allowed")]
    PeriodLocked(String),

    /// Account unknown to the ledger.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// The ledger refused the posting for another reason.
    #[error("Posting rejected: {0}")]
    Rejected(String),

    // ========== Database Errors ==========
    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl LedgerError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InsufficientLines => "INSUFFICIENT_LINES",
            Self::UnbalancedPosting { .. } => "UNBALANCED_POSTING",
            Self::NegativeAmount(_) => "NEGATIVE_AMOUNT",
            Self::InvalidEntryType(_) => "INVALID_ENTRY_TYPE",
            Self::MissingAccount => "MISSING_ACCOUNT",
            Self::PeriodLocked(_) => "PERIOD_LOCKED",
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::Rejected(_) => "POSTING_REJECTED",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Returns true if the posting itself is malformed, as opposed to refused by the ledger.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InsufficientLines
                | Self::UnbalancedPosting { .. }
                | Self::NegativeAmount(_)
                | Self::InvalidEntryType(_)
                | Self::MissingAccount
        )
    }
}
