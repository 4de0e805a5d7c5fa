//! Period lock repository.
//!
//! The unique key on (company, year, month) makes locking atomic across
//! server instances: the insert that wins owns the lock. The insert runs
//! under the exclusive year guard, so it waits for postings of the same
//! company and year that are mid-transaction.

use async_trait::async_trait;
use closure_core::fiscal::{FiscalPeriod, LockOutcome, LockStoreError, PeriodKey, PeriodLock, PeriodLockStore};
use closure_shared::types::{ClosureRunId, CompanyId, UserId};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    Set, TransactionTrait,
};
use uuid::Uuid;

use super::{YearGuard, hold_year_guard, month_column};
use crate::entities::fiscal_period_locks;

fn store_error(err: DbErr) -> LockStoreError {
    LockStoreError(err.to_string())
}

fn to_period(key: PeriodKey, model: fiscal_period_locks::Model) -> FiscalPeriod {
    FiscalPeriod {
        key,
        locked_at: Some(model.locked_at.to_utc()),
        locked_by_run: Some(ClosureRunId::from_uuid(model.locked_by_run)),
        locked_by: model.locked_by.map(UserId::from_uuid),
    }
}

/// Postgres-backed period locks.
#[derive(Debug, Clone)]
pub struct PeriodLockRepository {
    db: DatabaseConnection,
}

impl PeriodLockRepository {
    /// Creates a new period lock repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PeriodLockStore for PeriodLockRepository {
    async fn find(&self, key: &PeriodKey) -> Result<Option<FiscalPeriod>, LockStoreError> {
        let model = fiscal_period_locks::Entity::find()
            .filter(fiscal_period_locks::Column::CompanyId.eq(key.company_id.into_inner()))
            .filter(fiscal_period_locks::Column::Year.eq(key.year))
            .filter(fiscal_period_locks::Column::Month.eq(month_column(key)))
            .one(&self.db)
            .await
            .map_err(store_error)?;
        Ok(model.map(|model| to_period(*key, model)))
    }

    async fn lock_if_unlocked(
        &self,
        key: &PeriodKey,
        lock: PeriodLock,
    ) -> Result<LockOutcome, LockStoreError> {
        let model = fiscal_period_locks::ActiveModel {
            id: Set(Uuid::now_v7()),
            company_id: Set(key.company_id.into_inner()),
            year: Set(key.year),
            month: Set(month_column(key)),
            locked_at: Set(lock.locked_at.into()),
            locked_by_run: Set(lock.run_id.into_inner()),
            locked_by: Set(lock.locked_by.map(UserId::into_inner)),
        };
        let txn = self.db.begin().await.map_err(store_error)?;
        hold_year_guard(&txn, key.company_id, key.year, YearGuard::Exclusive)
            .await
            .map_err(store_error)?;
        let inserted = fiscal_period_locks::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    fiscal_period_locks::Column::CompanyId,
                    fiscal_period_locks::Column::Year,
                    fiscal_period_locks::Column::Month,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&txn)
            .await
            .map_err(store_error)?;
        txn.commit().await.map_err(store_error)?;

        let period = self
            .find(key)
            .await?
            .ok_or_else(|| LockStoreError(format!("lock of {key} vanished after insert")))?;
        Ok(if inserted == 0 {
            LockOutcome::AlreadyLocked(period)
        } else {
            LockOutcome::Locked(period)
        })
    }

    async fn locked_months(
        &self,
        company_id: CompanyId,
        year: i32,
    ) -> Result<Vec<u32>, LockStoreError> {
        let months: Vec<i16> = fiscal_period_locks::Entity::find()
            .select_only()
            .column(fiscal_period_locks::Column::Month)
            .filter(fiscal_period_locks::Column::CompanyId.eq(company_id.into_inner()))
            .filter(fiscal_period_locks::Column::Year.eq(year))
            .filter(fiscal_period_locks::Column::Month.gt(0))
            .order_by_asc(fiscal_period_locks::Column::Month)
            .into_tuple()
            .all(&self.db)
            .await
            .map_err(store_error)?;
        Ok(months
            .into_iter()
            .filter_map(|month| u32::try_from(month).ok())
            .collect())
    }
}
