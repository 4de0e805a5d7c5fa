//! Collaborator traits for reading and writing the general ledger.

use async_trait::async_trait;
use closure_shared::types::CompanyId;

use super::balance::{AccountBalance, ChartAccount};
use super::error::LedgerError;
use super::types::{JournalPosting, PostingReference};
use crate::fiscal::{DateRange, PeriodKey};

/// Accepts journal postings into the general ledger.
///
/// Implementations must refuse postings into locked periods with
/// [`LedgerError::PeriodLocked`].
#[async_trait]
pub trait LedgerPostingGateway: Send + Sync {
    /// Posts a validated, balanced entry.
    async fn post(&self, posting: &JournalPosting) -> Result<PostingReference, LedgerError>;
}

/// Reads account turnover and recorded postings.
#[async_trait]
pub trait AccountLedger: Send + Sync {
    /// Debit and credit totals per account for entries dated inside `range`,
    /// leaving out postings whose source is in `excluded_sources`.
    /// Accounts without movement may be omitted.
    async fn balances(
        &self,
        company_id: CompanyId,
        range: DateRange,
        excluded_sources: &[String],
    ) -> Result<Vec<AccountBalance>, LedgerError>;

    /// Postings of `period` stamped with `source`, oldest first.
    async fn postings_for(
        &self,
        period: &PeriodKey,
        source: &str,
    ) -> Result<Vec<PostingReference>, LedgerError>;
}

/// Looks up accounts in the company's chart.
#[async_trait]
pub trait ChartOfAccounts: Send + Sync {
    /// The account with `code`, `None` if the chart does not define it.
    async fn account(
        &self,
        company_id: CompanyId,
        code: &str,
    ) -> Result<Option<ChartAccount>, LedgerError>;
}
