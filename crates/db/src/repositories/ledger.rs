//! General ledger repository: posting gateway, account balances, chart.

use async_trait::async_trait;
use chrono::Utc;
use closure_core::fiscal::{DateRange, PeriodKey};
use closure_core::ledger::{
    AccountBalance, AccountFunction, AccountLedger, ChartAccount, ChartOfAccounts,
    JournalPosting, LedgerError, LedgerPostingGateway, PostingReference, validate_posting,
};
use closure_shared::types::{CompanyId, PostingId};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr,
    EntityTrait, FromQueryResult, PaginatorTrait, QueryFilter, QueryOrder, Set, Statement,
    TransactionTrait, Value,
};
use tracing::debug;
use uuid::Uuid;

use super::{YearGuard, hold_year_guard, month_column};
use crate::entities::{chart_accounts, fiscal_period_locks, journal_lines, journal_postings};

const BALANCES_SELECT: &str = r"
SELECT l.account_code,
       COALESCE(SUM(l.debit), 0) AS debit_total,
       COALESCE(SUM(l.credit), 0) AS credit_total
FROM journal_lines l
JOIN journal_postings p ON p.id = l.posting_id
WHERE p.company_id = $1 AND p.entry_date BETWEEN $2 AND $3";

const BALANCES_GROUP: &str = "
GROUP BY l.account_code
ORDER BY l.account_code";

/// Turnover query for `range`, leaving out `excluded_sources`.
fn balances_statement(
    company_id: CompanyId,
    range: DateRange,
    excluded_sources: &[String],
) -> Statement {
    let mut sql = BALANCES_SELECT.to_string();
    let mut values: Vec<Value> = vec![
        company_id.into_inner().into(),
        range.start.into(),
        range.end.into(),
    ];
    if !excluded_sources.is_empty() {
        let placeholders: Vec<String> = (0..excluded_sources.len())
            .map(|index| format!("${}", index + 4))
            .collect();
        sql.push_str(&format!(" AND p.source NOT IN ({})", placeholders.join(", ")));
        values.extend(excluded_sources.iter().map(|source| Value::from(source.clone())));
    }
    sql.push_str(BALANCES_GROUP);
    Statement::from_sql_and_values(DbBackend::Postgres, sql, values)
}

#[derive(Debug, FromQueryResult)]
struct BalanceRow {
    account_code: String,
    debit_total: Decimal,
    credit_total: Decimal,
}

fn db_error(err: DbErr) -> LedgerError {
    LedgerError::Database(err.to_string())
}

/// Parses the stored account function.
pub fn parse_function(value: &str) -> Option<AccountFunction> {
    match value {
        "active" => Some(AccountFunction::Active),
        "passive" => Some(AccountFunction::Passive),
        "bifunctional" => Some(AccountFunction::Bifunctional),
        "off_balance" => Some(AccountFunction::OffBalance),
        _ => None,
    }
}

/// Postgres-backed general ledger.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    db: DatabaseConnection,
}

impl LedgerRepository {
    /// Creates a new ledger repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// A monthly posting is refused when its month or its year is locked,
    /// a year-end posting when the year is locked.
    async fn is_locked<C: ConnectionTrait>(conn: &C, period: &PeriodKey) -> Result<bool, DbErr> {
        let months = match period.month {
            Some(_) => vec![0, month_column(period)],
            None => vec![0],
        };
        let locks = fiscal_period_locks::Entity::find()
            .filter(fiscal_period_locks::Column::CompanyId.eq(period.company_id.into_inner()))
            .filter(fiscal_period_locks::Column::Year.eq(period.year))
            .filter(fiscal_period_locks::Column::Month.is_in(months))
            .count(conn)
            .await?;
        Ok(locks > 0)
    }
}

#[async_trait]
impl LedgerPostingGateway for LedgerRepository {
    async fn post(&self, posting: &JournalPosting) -> Result<PostingReference, LedgerError> {
        let totals = validate_posting(posting)?;

        let txn = self.db.begin().await.map_err(db_error)?;
        hold_year_guard(
            &txn,
            posting.company_id,
            posting.period.year,
            YearGuard::Shared,
        )
        .await
        .map_err(db_error)?;
        if Self::is_locked(&txn, &posting.period).await.map_err(db_error)? {
            return Err(LedgerError::PeriodLocked(posting.period.to_string()));
        }

        let posting_id = PostingId::new();
        journal_postings::ActiveModel {
            id: Set(posting_id.into_inner()),
            company_id: Set(posting.company_id.into_inner()),
            year: Set(posting.period.year),
            month: Set(month_column(&posting.period)),
            entry_date: Set(posting.entry_date),
            source: Set(posting.source.clone()),
            description: Set(posting.description.clone()),
            closure_run_id: Set(posting.closure_run_id.into_inner()),
            total: Set(totals.debit),
            created_at: Set(Utc::now().into()),
        }
        .insert(&txn)
        .await
        .map_err(db_error)?;

        let lines = posting.lines.iter().enumerate().map(|(index, line)| {
            journal_lines::ActiveModel {
                id: Set(Uuid::now_v7()),
                posting_id: Set(posting_id.into_inner()),
                line_no: Set(i32::try_from(index + 1).unwrap_or(i32::MAX)),
                account_code: Set(line.account_code.clone()),
                debit: Set(line.debit),
                credit: Set(line.credit),
                description: Set(line.description.clone()),
            }
        });
        journal_lines::Entity::insert_many(lines)
            .exec(&txn)
            .await
            .map_err(db_error)?;
        txn.commit().await.map_err(db_error)?;

        debug!(posting_id = %posting_id, source = %posting.source, "Journal posting stored");
        Ok(PostingReference {
            posting_id,
            source: posting.source.clone(),
            entry_date: posting.entry_date,
            amount: totals.debit,
        })
    }
}

#[async_trait]
impl AccountLedger for LedgerRepository {
    async fn balances(
        &self,
        company_id: CompanyId,
        range: DateRange,
        excluded_sources: &[String],
    ) -> Result<Vec<AccountBalance>, LedgerError> {
        let statement = balances_statement(company_id, range, excluded_sources);
        let rows = BalanceRow::find_by_statement(statement)
            .all(&self.db)
            .await
            .map_err(db_error)?;
        Ok(rows
            .into_iter()
            .map(|row| AccountBalance::new(row.account_code, row.debit_total, row.credit_total))
            .collect())
    }

    async fn postings_for(
        &self,
        period: &PeriodKey,
        source: &str,
    ) -> Result<Vec<PostingReference>, LedgerError> {
        let models = journal_postings::Entity::find()
            .filter(journal_postings::Column::CompanyId.eq(period.company_id.into_inner()))
            .filter(journal_postings::Column::Year.eq(period.year))
            .filter(journal_postings::Column::Month.eq(month_column(period)))
            .filter(journal_postings::Column::Source.eq(source))
            .order_by_asc(journal_postings::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_error)?;
        Ok(models
            .into_iter()
            .map(|model| PostingReference {
                posting_id: PostingId::from_uuid(model.id),
                source: model.source,
                entry_date: model.entry_date,
                amount: model.total,
            })
            .collect())
    }
}

#[async_trait]
impl ChartOfAccounts for LedgerRepository {
    async fn account(
        &self,
        company_id: CompanyId,
        code: &str,
    ) -> Result<Option<ChartAccount>, LedgerError> {
        let Some(model) = chart_accounts::Entity::find_by_id((company_id.into_inner(), code.to_string()))
            .one(&self.db)
            .await
            .map_err(db_error)?
        else {
            return Ok(None);
        };
        let function = parse_function(&model.function).ok_or_else(|| {
            LedgerError::Database(format!(
                "account {} has unknown function '{}'",
                model.code, model.function
            ))
        })?;
        Ok(Some(ChartAccount::new(model.code, model.name, function)))
    }
}
