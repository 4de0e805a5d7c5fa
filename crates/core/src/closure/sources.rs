//! Collaborators the step executors read from, and the run history store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use closure_shared::types::{AssetId, ClosureRunId, CompanyId, PageRequest};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::ClosureRun;
use crate::currency::ExchangeRate;
use crate::ledger::{AccountLedger, ChartOfAccounts, EntryType};

/// A collaborator failed to answer.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct SourceError(pub String);

/// Scheduled depreciation of one asset for one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepreciationLine {
    /// Asset.
    pub asset_id: AssetId,
    /// Asset name, for messages.
    pub asset_name: String,
    /// Accumulated depreciation account of the asset class, e.g. "2813".
    pub asset_class: String,
    /// Expense account, the configured default when `None`.
    pub expense_account: Option<String>,
    /// Scheduled amount for the month.
    pub amount: Decimal,
    /// Inactive (disposed, fully depreciated) assets are ignored.
    pub is_active: bool,
}

/// An open foreign-currency monetary balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignCurrencyBalance {
    /// Account code, e.g. "5124" or "401".
    pub account_code: String,
    /// Currency code.
    pub currency: String,
    /// Amount in foreign currency.
    pub foreign_amount: Decimal,
    /// Amount currently carried in functional currency.
    pub carrying_amount: Decimal,
    /// Debit for assets (receivables, cash), credit for liabilities.
    pub normal_side: EntryType,
}

/// How often a company settles VAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VatCadence {
    /// Every month.
    Monthly,
    /// At the end of each calendar quarter.
    Quarterly,
}

/// VAT registration of a company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VatSettings {
    /// Whether the company is registered for VAT.
    pub is_vat_payer: bool,
    /// Settlement cadence.
    pub cadence: VatCadence,
}

impl Default for VatSettings {
    fn default() -> Self {
        Self {
            is_vat_payer: true,
            cadence: VatCadence::Monthly,
        }
    }
}

/// Fixed asset depreciation schedule.
#[async_trait]
pub trait FixedAssetRegister: Send + Sync {
    /// Scheduled depreciation of every asset for the month.
    async fn scheduled_depreciation(
        &self,
        company_id: CompanyId,
        year: i32,
        month: u32,
    ) -> Result<Vec<DepreciationLine>, SourceError>;
}

/// Foreign-currency monetary items.
#[async_trait]
pub trait ForeignCurrencyLedger: Send + Sync {
    /// Balances open at `as_of`.
    async fn open_balances(
        &self,
        company_id: CompanyId,
        as_of: NaiveDate,
    ) -> Result<Vec<ForeignCurrencyBalance>, SourceError>;
}

/// Period-end exchange rates.
#[async_trait]
pub trait ExchangeRateSource: Send + Sync {
    /// Closing rate of `currency` into the functional currency on `date`:
    /// the latest rate published on or before it.
    async fn closing_rate(
        &self,
        currency: &str,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>, SourceError>;
}

/// Company VAT configuration.
#[async_trait]
pub trait VatSettingsProvider: Send + Sync {
    /// VAT settings of the company.
    async fn settings(&self, company_id: CompanyId) -> Result<VatSettings, SourceError>;
}

/// Filter of the run history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct RunFilter {
    /// Restrict to a year.
    pub year: Option<i32>,
    /// Restrict to a month.
    pub month: Option<u32>,
}

impl RunFilter {
    /// Returns true if `run` passes the filter.
    #[must_use]
    pub fn matches(&self, run: &ClosureRun) -> bool {
        self.year.is_none_or(|year| run.period.year == year)
            && self.month.is_none_or(|month| run.period.month == Some(month))
    }
}

/// Immutable history of finished runs.
#[async_trait]
pub trait ClosureRunStore: Send + Sync {
    /// Stores a finished run.
    async fn save(&self, run: &ClosureRun) -> Result<(), SourceError>;

    /// One run of the company.
    async fn find(
        &self,
        company_id: CompanyId,
        run_id: ClosureRunId,
    ) -> Result<Option<ClosureRun>, SourceError>;

    /// Runs of the company, newest first, with the total count.
    async fn list(
        &self,
        company_id: CompanyId,
        filter: RunFilter,
        page: PageRequest,
    ) -> Result<(Vec<ClosureRun>, u64), SourceError>;
}

/// Everything the step executors read from.
#[derive(Clone)]
pub struct ClosureSources {
    /// Account turnover.
    pub ledger: Arc<dyn AccountLedger>,
    /// Chart of accounts.
    pub chart: Arc<dyn ChartOfAccounts>,
    /// Depreciation schedule.
    pub assets: Arc<dyn FixedAssetRegister>,
    /// Foreign-currency balances.
    pub foreign_balances: Arc<dyn ForeignCurrencyLedger>,
    /// Closing rates.
    pub rates: Arc<dyn ExchangeRateSource>,
    /// VAT configuration.
    pub vat_settings: Arc<dyn VatSettingsProvider>,
}
