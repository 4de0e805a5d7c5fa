//! Structural validation of journal postings before they reach the ledger.

use rust_decimal::Decimal;

use super::error::LedgerError;
use super::types::{JournalPosting, PostingTotals};

/// Validates that a posting is well formed and balanced.
///
/// Every line must name an account and carry exactly one positive amount.
///
/// # Errors
///
/// Returns the first rule the posting breaks.
pub fn validate_posting(posting: &JournalPosting) -> Result<PostingTotals, LedgerError> {
    if posting.lines.len() < 2 {
        return Err(LedgerError::InsufficientLines);
    }

    for line in &posting.lines {
        if line.account_code.trim().is_empty() {
            return Err(LedgerError::MissingAccount);
        }
        if line.debit < Decimal::ZERO || line.credit < Decimal::ZERO {
            return Err(LedgerError::NegativeAmount(line.account_code.clone()));
        }
        let has_debit = line.debit > Decimal::ZERO;
        let has_credit = line.credit > Decimal::ZERO;
        if has_debit == has_credit {
            return Err(LedgerError::InvalidEntryType(line.account_code.clone()));
        }
    }

    let totals = posting.totals();
    if !totals.is_balanced {
        return Err(LedgerError::UnbalancedPosting {
            debit: totals.debit,
            credit: totals.credit,
        });
    }

    Ok(totals)
}
