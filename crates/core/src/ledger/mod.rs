//! Double-entry ledger seam used by the closure engine.
//!
//! The engine never writes the general ledger itself. It builds balanced
//! journal postings, validates them here and hands them to a
//! [`LedgerPostingGateway`]. Balances and the chart of accounts are read
//! through [`AccountLedger`] and [`ChartOfAccounts`].

pub mod balance;
pub mod error;
pub mod gateway;
pub mod types;
pub mod validation;

#[cfg(test)]
mod validation_props;

pub use balance::{AccountBalance, AccountFunction, ChartAccount, NormalSide};
pub use error::LedgerError;
pub use gateway::{AccountLedger, ChartOfAccounts, LedgerPostingGateway};
pub use types::{EntryType, JournalLine, JournalPosting, PostingReference, PostingTotals};
pub use validation::validate_posting;
