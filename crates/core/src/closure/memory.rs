//! In-memory collaborators for tests and previews.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use closure_shared::types::{ClosureRunId, CompanyId, PageRequest, PostingId};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;

use super::sources::{
    ClosureRunStore, ClosureSources, DepreciationLine, ExchangeRateSource, FixedAssetRegister,
    ForeignCurrencyBalance, ForeignCurrencyLedger, RunFilter, SourceError, VatSettings,
    VatSettingsProvider,
};
use super::types::ClosureRun;
use crate::currency::ExchangeRate;
use crate::fiscal::{
    DateRange, FiscalPeriod, LockOutcome, LockStoreError, PeriodKey, PeriodLock, PeriodLockStore,
};
use crate::ledger::{
    AccountBalance, AccountFunction, AccountLedger, ChartAccount, ChartOfAccounts, JournalLine,
    JournalPosting, LedgerError, LedgerPostingGateway, PostingReference, validate_posting,
};
use crate::ledger::balance::account_class;

/// Lock state held in a map. `lock_if_unlocked` is atomic per key.
#[derive(Default)]
pub struct InMemoryPeriodLocks {
    periods: DashMap<PeriodKey, FiscalPeriod>,
}

impl InMemoryPeriodLocks {
    /// Marks a period locked without a run, e.g. closed by an earlier system.
    pub fn mark_locked(&self, key: PeriodKey) {
        self.periods.insert(
            key,
            FiscalPeriod {
                locked_at: Some(chrono::Utc::now()),
                ..FiscalPeriod::open(key)
            },
        );
    }

    fn is_locked(&self, key: &PeriodKey) -> bool {
        self.periods.get(key).is_some_and(|period| period.is_locked())
    }
}

#[async_trait]
impl PeriodLockStore for InMemoryPeriodLocks {
    async fn find(&self, key: &PeriodKey) -> Result<Option<FiscalPeriod>, LockStoreError> {
        Ok(self.periods.get(key).map(|period| period.clone()))
    }

    async fn lock_if_unlocked(
        &self,
        key: &PeriodKey,
        lock: PeriodLock,
    ) -> Result<LockOutcome, LockStoreError> {
        let locked = FiscalPeriod {
            key: *key,
            locked_at: Some(lock.locked_at),
            locked_by_run: Some(lock.run_id),
            locked_by: lock.locked_by,
        };
        Ok(match self.periods.entry(*key) {
            Entry::Occupied(mut existing) => {
                if existing.get().is_locked() {
                    LockOutcome::AlreadyLocked(existing.get().clone())
                } else {
                    existing.insert(locked.clone());
                    LockOutcome::Locked(locked)
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(locked.clone());
                LockOutcome::Locked(locked)
            }
        })
    }

    async fn locked_months(
        &self,
        company_id: CompanyId,
        year: i32,
    ) -> Result<Vec<u32>, LockStoreError> {
        let mut months: Vec<u32> = self
            .periods
            .iter()
            .filter(|entry| {
                let key = entry.key();
                key.company_id == company_id && key.year == year && entry.value().is_locked()
            })
            .filter_map(|entry| entry.key().month)
            .collect();
        months.sort_unstable();
        Ok(months)
    }
}

#[derive(Debug, Clone)]
struct LedgerRow {
    date: NaiveDate,
    source: Option<String>,
    line: JournalLine,
}

/// A small general ledger with its satellite registers.
///
/// Postings go through the same validation as the real ledger and are
/// refused for locked periods when a lock store is attached.
#[derive(Default)]
pub struct InMemoryBooks {
    rows: DashMap<CompanyId, Vec<LedgerRow>>,
    postings: DashMap<PostingId, JournalPosting>,
    chart: DashMap<String, ChartAccount>,
    depreciation: DashMap<(CompanyId, i32, u32), Vec<DepreciationLine>>,
    foreign_balances: DashMap<CompanyId, Vec<ForeignCurrencyBalance>>,
    rates: DashMap<(String, NaiveDate), ExchangeRate>,
    vat_settings: DashMap<CompanyId, VatSettings>,
    locks: Option<Arc<InMemoryPeriodLocks>>,
}

impl InMemoryBooks {
    /// Books whose gateway honours `locks`.
    #[must_use]
    pub fn with_locks(locks: Arc<InMemoryPeriodLocks>) -> Self {
        Self {
            locks: Some(locks),
            ..Self::default()
        }
    }

    /// Loads the accounts the closure touches from the Romanian chart.
    #[must_use]
    pub fn with_romanian_chart(self) -> Self {
        const ACCOUNTS: [(&str, &str); 24] = [
            ("1061", "Legal reserves"),
            ("1063", "Statutory reserves"),
            ("1068", "Other reserves"),
            ("117", "Retained earnings"),
            ("121", "Profit or loss"),
            ("2813", "Accumulated depreciation of equipment"),
            ("2814", "Accumulated depreciation of other tangible assets"),
            ("401", "Suppliers"),
            ("4111", "Customers"),
            ("4411", "Profit tax"),
            ("4423", "VAT payable"),
            ("4424", "VAT receivable"),
            ("4426", "VAT deductible"),
            ("4427", "VAT collected"),
            ("457", "Dividends payable"),
            ("5124", "Bank accounts in foreign currency"),
            ("607", "Cost of goods sold"),
            ("628", "Other third-party services"),
            ("641", "Salaries"),
            ("665", "Foreign exchange losses"),
            ("6811", "Depreciation expense"),
            ("691", "Profit tax expense"),
            ("707", "Revenue from sale of goods"),
            ("765", "Foreign exchange gains"),
        ];
        for (code, name) in ACCOUNTS {
            // 121 carries either sign at year end.
            let function = if code == "121" {
                AccountFunction::Bifunctional
            } else {
                account_class(code)
                    .and_then(AccountFunction::from_class)
                    .unwrap_or(AccountFunction::Bifunctional)
            };
            self.add_account(ChartAccount::new(code, name, function));
        }
        self
    }

    /// Adds or replaces a chart account.
    pub fn add_account(&self, account: ChartAccount) {
        self.chart.insert(account.code.clone(), account);
    }

    /// Records turnover on an account outside of any posting.
    pub fn record_movement(
        &self,
        company_id: CompanyId,
        date: NaiveDate,
        account_code: &str,
        debit: Decimal,
        credit: Decimal,
    ) {
        let line = JournalLine {
            account_code: account_code.to_string(),
            debit,
            credit,
            description: None,
        };
        self.rows
            .entry(company_id)
            .or_default()
            .push(LedgerRow {
                date,
                source: None,
                line,
            });
    }

    /// Adds a depreciation schedule line.
    pub fn add_depreciation(&self, company_id: CompanyId, year: i32, month: u32, line: DepreciationLine) {
        self.depreciation
            .entry((company_id, year, month))
            .or_default()
            .push(line);
    }

    /// Adds an open foreign-currency balance.
    pub fn add_foreign_balance(&self, company_id: CompanyId, balance: ForeignCurrencyBalance) {
        self.foreign_balances.entry(company_id).or_default().push(balance);
    }

    /// Sets a closing rate.
    pub fn set_rate(&self, currency: &str, date: NaiveDate, rate: Decimal) {
        self.rates.insert(
            (currency.to_uppercase(), date),
            ExchangeRate::new(currency.to_uppercase(), rate, date),
        );
    }

    /// Sets the VAT registration of a company.
    pub fn set_vat_settings(&self, company_id: CompanyId, settings: VatSettings) {
        self.vat_settings.insert(company_id, settings);
    }

    /// Postings accepted for a company, in no particular order.
    #[must_use]
    pub fn posted(&self, company_id: CompanyId) -> Vec<JournalPosting> {
        self.postings
            .iter()
            .filter(|entry| entry.value().company_id == company_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Bundles these books as step sources.
    #[must_use]
    pub fn sources(self: &Arc<Self>) -> ClosureSources {
        ClosureSources {
            ledger: self.clone(),
            chart: self.clone(),
            assets: self.clone(),
            foreign_balances: self.clone(),
            rates: self.clone(),
            vat_settings: self.clone(),
        }
    }

    fn refuses(&self, period: &PeriodKey) -> bool {
        self.locks.as_ref().is_some_and(|locks| {
            locks.is_locked(period)
                || (period.month.is_some() && locks.is_locked(&period.year_key()))
        })
    }
}

#[async_trait]
impl LedgerPostingGateway for InMemoryBooks {
    async fn post(&self, posting: &JournalPosting) -> Result<PostingReference, LedgerError> {
        let totals = validate_posting(posting)?;
        if self.refuses(&posting.period) {
            return Err(LedgerError::PeriodLocked(posting.period.to_string()));
        }
        let posting_id = PostingId::new();
        let mut rows = self.rows.entry(posting.company_id).or_default();
        rows.extend(posting.lines.iter().map(|line| LedgerRow {
            date: posting.entry_date,
            source: Some(posting.source.clone()),
            line: line.clone(),
        }));
        drop(rows);
        self.postings.insert(posting_id, posting.clone());
        Ok(PostingReference {
            posting_id,
            source: posting.source.clone(),
            entry_date: posting.entry_date,
            amount: totals.debit,
        })
    }
}

#[async_trait]
impl AccountLedger for InMemoryBooks {
    async fn balances(
        &self,
        company_id: CompanyId,
        range: DateRange,
        excluded_sources: &[String],
    ) -> Result<Vec<AccountBalance>, LedgerError> {
        let mut totals: std::collections::BTreeMap<String, AccountBalance> =
            std::collections::BTreeMap::new();
        if let Some(rows) = self.rows.get(&company_id) {
            let counted = rows.iter().filter(|row| {
                range.contains(row.date)
                    && !row
                        .source
                        .as_ref()
                        .is_some_and(|source| excluded_sources.contains(source))
            });
            for row in counted {
                let balance = totals
                    .entry(row.line.account_code.clone())
                    .or_insert_with(|| {
                        AccountBalance::new(row.line.account_code.clone(), Decimal::ZERO, Decimal::ZERO)
                    });
                balance.add_debit(row.line.debit);
                balance.add_credit(row.line.credit);
            }
        }
        Ok(totals.into_values().collect())
    }

    async fn postings_for(
        &self,
        period: &PeriodKey,
        source: &str,
    ) -> Result<Vec<PostingReference>, LedgerError> {
        let mut found: Vec<PostingReference> = self
            .postings
            .iter()
            .filter(|entry| entry.value().period == *period && entry.value().source == source)
            .map(|entry| PostingReference {
                posting_id: *entry.key(),
                source: entry.value().source.clone(),
                entry_date: entry.value().entry_date,
                amount: entry.value().lines.iter().map(|line| line.debit).sum(),
            })
            .collect();
        found.sort_by_key(|reference| reference.posting_id);
        Ok(found)
    }
}

#[async_trait]
impl ChartOfAccounts for InMemoryBooks {
    async fn account(
        &self,
        _company_id: CompanyId,
        code: &str,
    ) -> Result<Option<ChartAccount>, LedgerError> {
        Ok(self.chart.get(code).map(|account| account.clone()))
    }
}

#[async_trait]
impl FixedAssetRegister for InMemoryBooks {
    async fn scheduled_depreciation(
        &self,
        company_id: CompanyId,
        year: i32,
        month: u32,
    ) -> Result<Vec<DepreciationLine>, SourceError> {
        Ok(self
            .depreciation
            .get(&(company_id, year, month))
            .map(|lines| lines.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ForeignCurrencyLedger for InMemoryBooks {
    async fn open_balances(
        &self,
        company_id: CompanyId,
        _as_of: NaiveDate,
    ) -> Result<Vec<ForeignCurrencyBalance>, SourceError> {
        Ok(self
            .foreign_balances
            .get(&company_id)
            .map(|balances| balances.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ExchangeRateSource for InMemoryBooks {
    async fn closing_rate(
        &self,
        currency: &str,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>, SourceError> {
        let currency = currency.to_uppercase();
        Ok(self
            .rates
            .iter()
            .filter(|entry| entry.key().0 == currency && entry.key().1 <= date)
            .max_by_key(|entry| entry.key().1)
            .map(|entry| entry.value().clone()))
    }
}

#[async_trait]
impl VatSettingsProvider for InMemoryBooks {
    async fn settings(&self, company_id: CompanyId) -> Result<VatSettings, SourceError> {
        Ok(self
            .vat_settings
            .get(&company_id)
            .map(|settings| *settings)
            .unwrap_or_default())
    }
}

/// Run history held in a map.
#[derive(Default)]
pub struct InMemoryRunStore {
    runs: DashMap<ClosureRunId, ClosureRun>,
}

#[async_trait]
impl ClosureRunStore for InMemoryRunStore {
    async fn save(&self, run: &ClosureRun) -> Result<(), SourceError> {
        match self.runs.entry(run.id) {
            Entry::Occupied(_) => Err(SourceError(format!("closure run {} already stored", run.id))),
            Entry::Vacant(slot) => {
                slot.insert(run.clone());
                Ok(())
            }
        }
    }

    async fn find(
        &self,
        company_id: CompanyId,
        run_id: ClosureRunId,
    ) -> Result<Option<ClosureRun>, SourceError> {
        Ok(self
            .runs
            .get(&run_id)
            .filter(|run| run.period.company_id == company_id)
            .map(|run| run.clone()))
    }

    async fn list(
        &self,
        company_id: CompanyId,
        filter: RunFilter,
        page: PageRequest,
    ) -> Result<(Vec<ClosureRun>, u64), SourceError> {
        let page = page.normalized();
        let mut runs: Vec<ClosureRun> = self
            .runs
            .iter()
            .filter(|run| run.period.company_id == company_id && filter.matches(run))
            .map(|run| run.clone())
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        let total = runs.len() as u64;
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
        Ok((runs.into_iter().skip(offset).take(limit).collect(), total))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::closure::options::{ClosureRequest, MonthlyOptions};
    use crate::closure::types::{RunMode, StepId};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn lock(run_id: ClosureRunId) -> PeriodLock {
        PeriodLock {
            run_id,
            locked_by: None,
            locked_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_concurrent_locks_single_winner() {
        let locks = Arc::new(InMemoryPeriodLocks::default());
        let key = PeriodKey::monthly(CompanyId::new(), 2025, 3);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let locks = Arc::clone(&locks);
                tokio::spawn(async move { locks.lock_if_unlocked(&key, lock(ClosureRunId::new())).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if matches!(handle.await.unwrap().unwrap(), LockOutcome::Locked(_)) {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_gateway_refuses_locked_period() {
        let locks = Arc::new(InMemoryPeriodLocks::default());
        let books = InMemoryBooks::with_locks(Arc::clone(&locks));
        let company_id = CompanyId::new();
        let period = PeriodKey::monthly(company_id, 2025, 3);
        let posting = JournalPosting {
            company_id,
            period,
            entry_date: NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            source: "closure:test".to_string(),
            description: "test".to_string(),
            closure_run_id: ClosureRunId::new(),
            lines: vec![
                JournalLine::debit("6811", dec!(10)),
                JournalLine::credit("2813", dec!(10)),
            ],
        };

        assert!(books.post(&posting).await.is_ok());
        locks.mark_locked(period.year_key());
        assert!(matches!(
            books.post(&posting).await,
            Err(LedgerError::PeriodLocked(_))
        ));
        assert_eq!(books.posted(company_id).len(), 1);
    }

    #[tokio::test]
    async fn test_balances_filter_by_range() {
        let books = InMemoryBooks::default();
        let company_id = CompanyId::new();
        let march = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        let april = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        books.record_movement(company_id, march, "4427", dec!(0), dec!(100));
        books.record_movement(company_id, march, "4427", dec!(10), dec!(0));
        books.record_movement(company_id, april, "4427", dec!(0), dec!(999));

        let balances = books
            .balances(company_id, DateRange::month(2025, 3).unwrap(), &[])
            .await
            .unwrap();
        assert_eq!(balances, vec![AccountBalance::new("4427", dec!(10), dec!(100))]);
    }

    #[tokio::test]
    async fn test_balances_leave_out_excluded_sources() {
        let books = InMemoryBooks::default();
        let company_id = CompanyId::new();
        let period = PeriodKey::monthly(company_id, 2025, 3);
        let date = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
        books.record_movement(company_id, date, "4427", dec!(0), dec!(100));
        let settlement = JournalPosting {
            company_id,
            period,
            entry_date: date,
            source: "closure:vat".to_string(),
            description: "settlement".to_string(),
            closure_run_id: ClosureRunId::new(),
            lines: vec![
                JournalLine::debit("4427", dec!(100)),
                JournalLine::credit("4423", dec!(100)),
            ],
        };
        books.post(&settlement).await.unwrap();
        let range = DateRange::month(2025, 3).unwrap();

        let all = books.balances(company_id, range, &[]).await.unwrap();
        assert!(all.contains(&AccountBalance::new("4427", dec!(100), dec!(100))));

        let before = books
            .balances(company_id, range, &["closure:vat".to_string()])
            .await
            .unwrap();
        assert_eq!(before, vec![AccountBalance::new("4427", dec!(0), dec!(100))]);

        let found = books.postings_for(&period, "closure:vat").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].amount, dec!(100));
        assert!(books.postings_for(&period, "closure:fx").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_store_lists_by_company_and_filter() {
        let store = InMemoryRunStore::default();
        let company_id = CompanyId::new();
        for month in [1, 2, 3] {
            let request = ClosureRequest::monthly(
                PeriodKey::monthly(company_id, 2025, month),
                RunMode::DryRun,
                MonthlyOptions::default(),
            );
            let run = ClosureRun::start(ClosureRunId::new(), &request, Vec::<StepId>::new(), Utc::now());
            store.save(&run).await.unwrap();
            assert!(store.save(&run).await.is_err());
        }

        let (all, total) = store
            .list(company_id, RunFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!((all.len(), total), (3, 3));

        let filter = RunFilter {
            year: Some(2025),
            month: Some(2),
        };
        let (february, total) = store.list(company_id, filter, PageRequest::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(february[0].period.month, Some(2));

        let (other, _) = store
            .list(CompanyId::new(), RunFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert!(other.is_empty());
    }
}
