//! End-to-end closure runs over the in-memory books.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use closure_shared::types::{AssetId, CompanyId, UserId};
use mockall::mock;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Notify;

use super::memory::{InMemoryBooks, InMemoryPeriodLocks, InMemoryRunStore};
use super::*;
use crate::fiscal::{PeriodKey, PeriodLockStore};
use crate::ledger::{
    EntryType, JournalPosting, LedgerError, LedgerPostingGateway, PostingReference,
};

mock! {
    Gateway {}

    #[async_trait]
    impl LedgerPostingGateway for Gateway {
        async fn post(&self, posting: &JournalPosting) -> Result<PostingReference, LedgerError>;
    }
}

mock! {
    Vat {}

    #[async_trait]
    impl VatSettingsProvider for Vat {
        async fn settings(&self, company_id: CompanyId) -> Result<VatSettings, SourceError>;
    }
}

struct World {
    company_id: CompanyId,
    books: Arc<InMemoryBooks>,
    locks: Arc<InMemoryPeriodLocks>,
    runs: Arc<InMemoryRunStore>,
}

impl World {
    fn new() -> Self {
        let locks = Arc::new(InMemoryPeriodLocks::default());
        let books = Arc::new(InMemoryBooks::with_locks(Arc::clone(&locks)).with_romanian_chart());
        Self {
            company_id: CompanyId::new(),
            books,
            locks,
            runs: Arc::new(InMemoryRunStore::default()),
        }
    }

    fn orchestrator(&self) -> ClosureOrchestrator {
        self.orchestrator_with(self.books.sources(), self.books.clone())
    }

    fn orchestrator_with(
        &self,
        sources: ClosureSources,
        gateway: Arc<dyn LedgerPostingGateway>,
    ) -> ClosureOrchestrator {
        ClosureOrchestrator::new(
            sources,
            gateway,
            self.locks.clone(),
            self.runs.clone(),
            ClosureSettings::default(),
        )
    }

    fn march(&self, mode: RunMode, options: MonthlyOptions) -> ClosureRequest {
        ClosureRequest::monthly(PeriodKey::monthly(self.company_id, 2025, 3), mode, options)
    }

    fn year(&self, mode: RunMode, options: AnnualOptions) -> ClosureRequest {
        ClosureRequest::annual(PeriodKey::annual(self.company_id, 2025), mode, options)
    }

    /// Depreciation, a EUR bank balance and VAT movements for March 2025.
    fn seed_march(&self) {
        let date = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
        self.books.add_depreciation(
            self.company_id,
            2025,
            3,
            DepreciationLine {
                asset_id: AssetId::new(),
                asset_name: "Delivery van".to_string(),
                asset_class: "2813".to_string(),
                expense_account: None,
                amount: dec!(1250.40),
                is_active: true,
            },
        );
        self.books.add_foreign_balance(
            self.company_id,
            ForeignCurrencyBalance {
                account_code: "5124".to_string(),
                currency: "EUR".to_string(),
                foreign_amount: dec!(10000),
                carrying_amount: dec!(49500),
                normal_side: EntryType::Debit,
            },
        );
        self.books
            .set_rate("EUR", NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(), dec!(4.9763));
        self.books
            .record_movement(self.company_id, date, "4427", dec!(0), dec!(1900));
        self.books
            .record_movement(self.company_id, date, "4426", dec!(1140), dec!(0));
    }

    /// Revenue of 500000 and expenses of 350000 in 2025.
    fn seed_year(&self, revenue: Decimal, expenses: Decimal) {
        let date = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        self.books
            .record_movement(self.company_id, date, "707", dec!(0), revenue);
        self.books
            .record_movement(self.company_id, date, "607", expenses, dec!(0));
    }

    async fn is_locked(&self, key: PeriodKey) -> bool {
        self.locks
            .find(&key)
            .await
            .unwrap()
            .is_some_and(|period| period.is_locked())
    }
}

fn statuses(run: &ClosureRun) -> Vec<(StepId, StepStatus)> {
    run.steps.iter().map(|step| (step.step_id, step.status)).collect()
}

fn reference_options() -> AnnualOptions {
    AnnualOptions {
        tax_adjustments: TaxAdjustments {
            non_deductible_expenses: dec!(10000),
            ..TaxAdjustments::default()
        },
        profit_distribution: DistributionRequest {
            legal_reserve: dec!(5000),
            dividends: dec!(100000),
            ..DistributionRequest::default()
        },
    }
}

/// Accepts the first `accept` postings, then rejects.
struct FlakyGateway {
    books: Arc<InMemoryBooks>,
    accept: usize,
    seen: AtomicUsize,
}

#[async_trait]
impl LedgerPostingGateway for FlakyGateway {
    async fn post(&self, posting: &JournalPosting) -> Result<PostingReference, LedgerError> {
        if self.seen.fetch_add(1, Ordering::SeqCst) < self.accept {
            self.books.post(posting).await
        } else {
            Err(LedgerError::Rejected("ledger unavailable".to_string()))
        }
    }
}

/// Holds the first posting until released.
struct StallingGateway {
    books: Arc<InMemoryBooks>,
    entered: Notify,
    release: Notify,
    stalled: AtomicUsize,
}

#[async_trait]
impl LedgerPostingGateway for StallingGateway {
    async fn post(&self, posting: &JournalPosting) -> Result<PostingReference, LedgerError> {
        if self.stalled.fetch_add(1, Ordering::SeqCst) == 0 {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.books.post(posting).await
    }
}

#[tokio::test]
async fn test_annual_commit_reference_figures() {
    let world = World::new();
    world.seed_year(dec!(500000), dec!(350000));
    let request = world
        .year(RunMode::Commit, reference_options())
        .requested_by(UserId::new());

    let run = world.orchestrator().run(request).await;

    assert_eq!(run.status, RunStatus::Success, "errors: {:?}", run.errors);
    let result = run.year_end_result.unwrap();
    assert_eq!(result.total_revenue, dec!(500000));
    assert_eq!(result.total_expenses, dec!(350000));
    assert_eq!(result.accounting_profit, dec!(150000));
    assert_eq!(result.taxable_profit, dec!(160000));
    assert_eq!(result.profit_tax_amount, dec!(25600));
    assert_eq!(result.net_profit, dec!(124400));

    let distribution = result.distribution.unwrap();
    assert_eq!(distribution.legal_reserve, dec!(5000));
    assert_eq!(distribution.dividends, dec!(100000));
    assert_eq!(distribution.retained_earnings, dec!(19400));

    assert!(run.steps.iter().all(|step| step.status == StepStatus::Success));
    assert!(world.is_locked(request.period).await);

    let posted = world.books.posted(world.company_id);
    assert!(!posted.is_empty());
    assert!(posted.iter().all(|posting| posting.closure_run_id == run.id));
    // Months were never closed individually.
    assert!(run.warnings.iter().any(|w| w.starts_with("months not yet closed in 2025")));
}

#[tokio::test]
async fn test_monthly_commit_posts_and_locks() {
    let world = World::new();
    world.seed_march();
    let request = world.march(RunMode::Commit, MonthlyOptions::default());

    let run = world.orchestrator().run(request).await;

    assert_eq!(run.status, RunStatus::Success, "errors: {:?}", run.errors);
    assert_eq!(
        statuses(&run),
        vec![
            (StepId::Depreciation, StepStatus::Success),
            (StepId::FxRevaluation, StepStatus::Success),
            (StepId::VatSettlement, StepStatus::Success),
            (StepId::PeriodLock, StepStatus::Success),
        ]
    );
    assert_eq!(world.books.posted(world.company_id).len(), 3);
    assert!(world.is_locked(request.period).await);

    let stored = world
        .runs
        .find(world.company_id, run.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, RunStatus::Success);
}

#[tokio::test]
async fn test_dry_run_never_posts_or_locks() {
    let world = World::new();
    world.seed_march();
    let mut gateway = MockGateway::new();
    gateway.expect_post().never();
    let orchestrator = world.orchestrator_with(world.books.sources(), Arc::new(gateway));
    let request = world.march(RunMode::DryRun, MonthlyOptions::default());

    let run = orchestrator.run(request).await;

    assert_eq!(run.status, RunStatus::Success, "errors: {:?}", run.errors);
    assert!(!world.is_locked(request.period).await);
    assert!(run.steps.iter().all(|step| step.postings.is_empty()));
    let depreciation = run.step(StepId::Depreciation).unwrap();
    assert_eq!(depreciation.journal_entries.len(), 1);
    let lock = run.step(StepId::PeriodLock).unwrap();
    assert!(lock.warnings.iter().any(|w| w.starts_with("dry run")));
}

#[tokio::test]
async fn test_skipped_vat_never_reads_vat_settings() {
    let world = World::new();
    world.seed_march();
    let mut vat = MockVat::new();
    vat.expect_settings().times(0);
    let sources = ClosureSources {
        vat_settings: Arc::new(vat),
        ..world.books.sources()
    };
    let orchestrator = world.orchestrator_with(sources, world.books.clone());
    let options = MonthlyOptions {
        skip_vat: true,
        ..MonthlyOptions::default()
    };

    let run = orchestrator.run(world.march(RunMode::Commit, options)).await;

    assert_eq!(run.status, RunStatus::Success, "errors: {:?}", run.errors);
    assert_eq!(
        run.step(StepId::VatSettlement).unwrap().status,
        StepStatus::Skipped
    );
    assert_eq!(world.books.posted(world.company_id).len(), 2);
}

#[tokio::test]
async fn test_commit_on_locked_period_fails_fast() {
    let world = World::new();
    world.seed_march();
    let request = world.march(RunMode::Commit, MonthlyOptions::default());
    world.locks.mark_locked(request.period);

    let run = world.orchestrator().run(request).await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.executed_steps(), 0);
    assert_eq!(run.errors.len(), 1);
    assert_eq!(run.errors[0].kind, ErrorKind::AlreadyLocked);
    assert_eq!(run.errors[0].step, None);
    assert!(world.books.posted(world.company_id).is_empty());
    assert_eq!(ClosureReport::from(&run).http_status_code(), 409);
}

#[tokio::test]
async fn test_second_commit_hits_lock_of_first() {
    let world = World::new();
    world.seed_march();
    let orchestrator = world.orchestrator();
    let request = world.march(RunMode::Commit, MonthlyOptions::default());

    let first = orchestrator.run(request).await;
    let second = orchestrator.run(request).await;

    assert!(first.is_success());
    assert_eq!(second.errors[0].code, "PERIOD_ALREADY_LOCKED");
    assert_eq!(world.books.posted(world.company_id).len(), 3);
}

#[tokio::test]
async fn test_dry_run_on_locked_period_is_a_preview() {
    let world = World::new();
    world.seed_march();
    let request = world.march(RunMode::DryRun, MonthlyOptions::default());
    world.locks.mark_locked(request.period);

    let run = world.orchestrator().run(request).await;

    assert_eq!(run.status, RunStatus::Success);
    assert!(run.warnings.iter().any(|w| w.contains("already locked")));
}

#[tokio::test]
async fn test_monthly_commit_in_locked_year_fails_fast() {
    let world = World::new();
    world.seed_march();
    world.locks.mark_locked(PeriodKey::annual(world.company_id, 2025));

    let run = world
        .orchestrator()
        .run(world.march(RunMode::Commit, MonthlyOptions::default()))
        .await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.executed_steps(), 0);
    assert_eq!(run.errors[0].code, "PERIOD_ALREADY_LOCKED");
    assert_eq!(run.errors[0].step, None);
    assert!(run.errors[0].message.contains("FY2025"));
    assert!(world.books.posted(world.company_id).is_empty());
    assert_eq!(ClosureReport::from(&run).http_status_code(), 409);
}

#[tokio::test]
async fn test_lock_only_month_in_locked_year_is_rejected() {
    let world = World::new();
    world.locks.mark_locked(PeriodKey::annual(world.company_id, 2025));
    let options = MonthlyOptions {
        skip_depreciation: true,
        skip_fx_revaluation: true,
        skip_vat: true,
    };
    let request = world.march(RunMode::Commit, options);

    let run = world.orchestrator().run(request).await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.errors[0].kind, ErrorKind::AlreadyLocked);
    assert!(!world.is_locked(request.period).await);
}

#[tokio::test]
async fn test_dry_run_in_locked_year_is_a_preview() {
    let world = World::new();
    world.seed_march();
    world.locks.mark_locked(PeriodKey::annual(world.company_id, 2025));

    let run = world
        .orchestrator()
        .run(world.march(RunMode::DryRun, MonthlyOptions::default()))
        .await;

    assert!(run.is_success(), "errors: {:?}", run.errors);
    assert!(run.warnings.iter().any(|w| w.contains("falls in locked period FY2025")));
}

#[tokio::test]
async fn test_dry_run_after_committed_year_repeats_figures() {
    let world = World::new();
    world.seed_year(dec!(500000), dec!(350000));
    let orchestrator = world.orchestrator();
    let committed = orchestrator
        .run(world.year(RunMode::Commit, reference_options()))
        .await;
    assert!(committed.is_success(), "errors: {:?}", committed.errors);
    let posted = world.books.posted(world.company_id).len();

    let audit = orchestrator
        .run(world.year(RunMode::DryRun, reference_options()))
        .await;

    assert!(audit.is_success(), "errors: {:?}", audit.errors);
    assert_eq!(audit.year_end_result, committed.year_end_result);
    let result = audit.year_end_result.unwrap();
    assert_eq!(result.accounting_profit, dec!(150000));
    assert_eq!(result.net_profit, dec!(124400));
    assert_eq!(result.distribution.unwrap().retained_earnings, dec!(19400));
    let pl = audit.step(StepId::ProfitAndLoss).unwrap();
    assert!(pl.warnings.iter().any(|w| w.contains("already in the ledger")));
    assert_eq!(world.books.posted(world.company_id).len(), posted);
}

#[tokio::test]
async fn test_rerun_after_partial_year_end_reuses_closing_entry() {
    let world = World::new();
    world.seed_year(dec!(500000), dec!(350000));
    let gateway = Arc::new(FlakyGateway {
        books: world.books.clone(),
        accept: 1,
        seen: AtomicUsize::new(0),
    });
    let request = world.year(RunMode::Commit, reference_options());

    let halted = world
        .orchestrator_with(world.books.sources(), gateway)
        .run(request)
        .await;
    assert_eq!(halted.status, RunStatus::PartialFailure);
    assert_eq!(halted.step(StepId::ProfitTax).unwrap().status, StepStatus::Error);

    let rerun = world.orchestrator().run(request).await;

    assert!(rerun.is_success(), "errors: {:?}", rerun.errors);
    let result = rerun.year_end_result.unwrap();
    assert_eq!(result.accounting_profit, dec!(150000));
    assert_eq!(result.profit_tax_amount, dec!(25600));
    assert_eq!(result.distribution.unwrap().retained_earnings, dec!(19400));
    assert!(world.is_locked(request.period).await);

    let posted = world.books.posted(world.company_id);
    for step in StepId::YEAR_END_CLOSING {
        let source = step.posting_source();
        assert_eq!(
            posted.iter().filter(|posting| posting.source == source).count(),
            1,
            "{source}"
        );
    }
    let pl = rerun.step(StepId::ProfitAndLoss).unwrap();
    assert_eq!(pl.postings.len(), 1);
    assert_eq!(pl.postings[0].source, "closure:pl");
}

#[tokio::test]
async fn test_concurrent_commit_is_rejected() {
    let world = World::new();
    world.seed_march();
    let gateway = Arc::new(StallingGateway {
        books: world.books.clone(),
        entered: Notify::new(),
        release: Notify::new(),
        stalled: AtomicUsize::new(0),
    });
    let orchestrator = Arc::new(world.orchestrator_with(world.books.sources(), gateway.clone()));
    let request = world.march(RunMode::Commit, MonthlyOptions::default());

    let first = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.run(request).await }
    });
    gateway.entered.notified().await;

    let second = orchestrator.run(request).await;
    assert_eq!(second.errors[0].code, "RUN_IN_PROGRESS");
    assert_eq!(second.executed_steps(), 0);

    gateway.release.notify_one();
    let first = first.await.unwrap();
    assert!(first.is_success(), "errors: {:?}", first.errors);
}

#[tokio::test]
async fn test_posting_failure_after_commit_is_partial() {
    let world = World::new();
    world.seed_march();
    let gateway = Arc::new(FlakyGateway {
        books: world.books.clone(),
        accept: 1,
        seen: AtomicUsize::new(0),
    });
    let orchestrator = world.orchestrator_with(world.books.sources(), gateway);

    let run = orchestrator
        .run(world.march(RunMode::Commit, MonthlyOptions::default()))
        .await;

    assert_eq!(run.status, RunStatus::PartialFailure);
    assert_eq!(
        statuses(&run),
        vec![
            (StepId::Depreciation, StepStatus::Success),
            (StepId::FxRevaluation, StepStatus::Error),
            (StepId::VatSettlement, StepStatus::Pending),
            (StepId::PeriodLock, StepStatus::Pending),
        ]
    );
    assert_eq!(run.errors[0].kind, ErrorKind::Posting);
    assert_eq!(run.errors[0].step, Some(StepId::FxRevaluation));
    assert!(!world.is_locked(PeriodKey::monthly(world.company_id, 2025, 3)).await);
    assert_eq!(ClosureReport::from(&run).http_status_code(), 422);
}

#[tokio::test]
async fn test_first_posting_failure_is_failed() {
    let world = World::new();
    world.seed_march();
    let gateway = Arc::new(FlakyGateway {
        books: world.books.clone(),
        accept: 0,
        seen: AtomicUsize::new(0),
    });
    let orchestrator = world.orchestrator_with(world.books.sources(), gateway);

    let run = orchestrator
        .run(world.march(RunMode::Commit, MonthlyOptions::default()))
        .await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.executed_steps(), 1);
}

#[tokio::test]
async fn test_missing_rate_halts_monthly_run() {
    let world = World::new();
    world.books.add_foreign_balance(
        world.company_id,
        ForeignCurrencyBalance {
            account_code: "5124".to_string(),
            currency: "USD".to_string(),
            foreign_amount: dec!(100),
            carrying_amount: dec!(460),
            normal_side: EntryType::Debit,
        },
    );

    let run = world
        .orchestrator()
        .run(world.march(RunMode::DryRun, MonthlyOptions::default()))
        .await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.errors[0].code, "NO_EXCHANGE_RATE");
    assert_eq!(run.errors[0].kind, ErrorKind::Calculation);
    assert!(world.books.posted(world.company_id).is_empty());
    assert!(!world.is_locked(PeriodKey::monthly(world.company_id, 2025, 3)).await);
}

#[tokio::test]
async fn test_over_allocation_rejected_before_any_step() {
    let world = World::new();
    world.seed_year(dec!(500000), dec!(350000));
    let mut options = reference_options();
    options.profit_distribution.dividends = dec!(124400);

    let run = world
        .orchestrator()
        .run(world.year(RunMode::Commit, options))
        .await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.executed_steps(), 0);
    assert_eq!(run.errors[0].code, "DISTRIBUTION_EXCEEDS_PROFIT");
    assert!(world.books.posted(world.company_id).is_empty());
    assert_eq!(ClosureReport::from(&run).http_status_code(), 400);
}

#[tokio::test]
async fn test_invalid_month_is_validation_error() {
    let world = World::new();
    let request = ClosureRequest::monthly(
        PeriodKey::monthly(world.company_id, 2025, 13),
        RunMode::DryRun,
        MonthlyOptions::default(),
    );

    let run = world.orchestrator().run(request).await;

    assert_eq!(run.errors[0].kind, ErrorKind::Validation);
    assert_eq!(ClosureReport::from(&run).http_status_code(), 400);
}

#[tokio::test]
async fn test_loss_year_pays_no_tax() {
    let world = World::new();
    world.seed_year(dec!(100000), dec!(130000));

    let run = world
        .orchestrator()
        .run(world.year(RunMode::Commit, AnnualOptions::default()))
        .await;

    assert!(run.is_success(), "errors: {:?}", run.errors);
    let result = run.year_end_result.unwrap();
    assert_eq!(result.accounting_profit, dec!(-30000));
    assert_eq!(result.profit_tax_amount, Decimal::ZERO);
    assert_eq!(result.net_profit, dec!(-30000));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_monthly_dry_run_never_posts_or_locks(
        skip_depreciation in any::<bool>(),
        skip_fx_revaluation in any::<bool>(),
        skip_vat in any::<bool>(),
        depreciation in 1i64..10_000_000,
        rate_published in any::<bool>(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let world = World::new();
        world.books.add_depreciation(
            world.company_id,
            2025,
            3,
            DepreciationLine {
                asset_id: AssetId::new(),
                asset_name: "Forklift".to_string(),
                asset_class: "2813".to_string(),
                expense_account: None,
                amount: Decimal::new(depreciation, 2),
                is_active: true,
            },
        );
        world.books.add_foreign_balance(
            world.company_id,
            ForeignCurrencyBalance {
                account_code: "5124".to_string(),
                currency: "EUR".to_string(),
                foreign_amount: dec!(2500),
                carrying_amount: dec!(12000),
                normal_side: EntryType::Debit,
            },
        );
        if rate_published {
            world
                .books
                .set_rate("EUR", NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(), dec!(4.9763));
        }
        let march = NaiveDate::from_ymd_opt(2025, 3, 20).unwrap();
        world.books.record_movement(world.company_id, march, "4427", dec!(0), dec!(760));
        let options = MonthlyOptions {
            skip_depreciation,
            skip_fx_revaluation,
            skip_vat,
        };
        let request = world.march(RunMode::DryRun, options);

        let run = runtime.block_on(world.orchestrator().run(request));

        prop_assert_eq!(run.status == RunStatus::Failed, !skip_fx_revaluation && !rate_published);
        prop_assert!(world.books.posted(world.company_id).is_empty());
        prop_assert!(run.steps.iter().all(|step| step.postings.is_empty()));
        prop_assert!(!runtime.block_on(world.is_locked(request.period)));
    }

    #[test]
    fn prop_dry_run_leaves_ledger_untouched(
        revenue in 0i64..10_000_000,
        expenses in 0i64..10_000_000,
        non_deductible in 0i64..100_000,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let world = World::new();
        world.seed_year(Decimal::new(revenue, 2), Decimal::new(expenses, 2));
        let options = AnnualOptions {
            tax_adjustments: TaxAdjustments {
                non_deductible_expenses: Decimal::new(non_deductible, 2),
                ..TaxAdjustments::default()
            },
            ..AnnualOptions::default()
        };
        let request = world.year(RunMode::DryRun, options);

        let run = runtime.block_on(world.orchestrator().run(request));

        prop_assert!(run.is_success());
        prop_assert!(world.books.posted(world.company_id).is_empty());
        prop_assert!(!runtime.block_on(world.is_locked(request.period)));
        let result = run.year_end_result.unwrap();
        prop_assert!(result.profit_tax_amount >= Decimal::ZERO);
        prop_assert_eq!(result.net_profit, result.accounting_profit - result.profit_tax_amount);
    }
}
