//! Repository abstractions for data access.
//!
//! Each repository implements one or more collaborator traits of
//! `closure-core`, hiding the `SeaORM` implementation details from the
//! closure engine.

pub mod closure_run;
pub mod closure_sources;
pub mod ledger;
pub mod period_lock;

pub use closure_run::ClosureRunRepository;
pub use closure_sources::ClosureSourceRepository;
pub use ledger::LedgerRepository;
pub use period_lock::PeriodLockRepository;

use closure_core::fiscal::PeriodKey;
use closure_shared::types::CompanyId;
use sea_orm::{ConnectionTrait, DbBackend, DbErr, Statement};

/// Stored month of a period: 1-12, or 0 for a fiscal year.
pub(crate) fn month_column(key: &PeriodKey) -> i16 {
    key.month
        .and_then(|month| i16::try_from(month).ok())
        .unwrap_or(0)
}

/// How a transaction holds the fiscal year guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearGuard {
    /// Held by postings; many at once.
    Shared,
    /// Held while a period of the year is being locked.
    Exclusive,
}

fn year_guard_statement(company_id: CompanyId, year: i32, guard: YearGuard) -> Statement {
    let function = match guard {
        YearGuard::Shared => "pg_advisory_xact_lock_shared",
        YearGuard::Exclusive => "pg_advisory_xact_lock",
    };
    Statement::from_sql_and_values(
        DbBackend::Postgres,
        format!("SELECT {function}(hashtext($1), $2)"),
        [company_id.to_string().into(), year.into()],
    )
}

/// Takes the transaction-scoped advisory lock of (company, year).
///
/// Postings hold it shared and lock inserts exclusively, so a posting's
/// lock check and its insert cannot interleave with a lock being set.
/// Released at commit or rollback.
pub async fn hold_year_guard<C: ConnectionTrait>(
    conn: &C,
    company_id: CompanyId,
    year: i32,
    guard: YearGuard,
) -> Result<(), DbErr> {
    conn.execute(year_guard_statement(company_id, year, guard))
        .await
        .map(|_| ())
}
