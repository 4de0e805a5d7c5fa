//! Closure run history repository.

use async_trait::async_trait;
use closure_core::closure::{ClosureRun, ClosureRunStore, RunFilter, SourceError};
use closure_shared::types::{ClosureRunId, CompanyId, PageRequest};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Serialize;

use super::month_column;
use crate::entities::closure_runs;

fn source_error(err: DbErr) -> SourceError {
    SourceError(err.to_string())
}

/// Serde name of a unit enum value, e.g. `partial_failure`.
pub fn label<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|value| value.as_str().map(str::to_owned))
        .unwrap_or_default()
}

fn decode(model: closure_runs::Model) -> Result<ClosureRun, SourceError> {
    serde_json::from_value(model.run)
        .map_err(|err| SourceError(format!("closure run {} is unreadable: {err}", model.id)))
}

/// Postgres-backed run history.
#[derive(Debug, Clone)]
pub struct ClosureRunRepository {
    db: DatabaseConnection,
}

impl ClosureRunRepository {
    /// Creates a new closure run repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ClosureRunStore for ClosureRunRepository {
    async fn save(&self, run: &ClosureRun) -> Result<(), SourceError> {
        let document = serde_json::to_value(run)
            .map_err(|err| SourceError(format!("closure run {} is unserializable: {err}", run.id)))?;
        closure_runs::ActiveModel {
            id: Set(run.id.into_inner()),
            company_id: Set(run.period.company_id.into_inner()),
            year: Set(run.period.year),
            month: Set(month_column(&run.period)),
            mode: Set(label(&run.mode)),
            status: Set(label(&run.status)),
            requested_by: Set(run.requested_by.map(|user| user.into_inner())),
            started_at: Set(run.started_at.into()),
            finished_at: Set(run.finished_at.map(Into::into)),
            run: Set(document),
        }
        .insert(&self.db)
        .await
        .map_err(source_error)?;
        Ok(())
    }

    async fn find(
        &self,
        company_id: CompanyId,
        run_id: ClosureRunId,
    ) -> Result<Option<ClosureRun>, SourceError> {
        closure_runs::Entity::find_by_id(run_id.into_inner())
            .filter(closure_runs::Column::CompanyId.eq(company_id.into_inner()))
            .one(&self.db)
            .await
            .map_err(source_error)?
            .map(decode)
            .transpose()
    }

    async fn list(
        &self,
        company_id: CompanyId,
        filter: RunFilter,
        page: PageRequest,
    ) -> Result<(Vec<ClosureRun>, u64), SourceError> {
        let page = page.normalized();
        let mut query =
            closure_runs::Entity::find().filter(closure_runs::Column::CompanyId.eq(company_id.into_inner()));
        if let Some(year) = filter.year {
            query = query.filter(closure_runs::Column::Year.eq(year));
        }
        if let Some(month) = filter.month.and_then(|month| i16::try_from(month).ok()) {
            query = query.filter(closure_runs::Column::Month.eq(month));
        }

        let total = query.clone().count(&self.db).await.map_err(source_error)?;
        let models = query
            .order_by_desc(closure_runs::Column::StartedAt)
            .order_by_desc(closure_runs::Column::Id)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .map_err(source_error)?;
        let runs = models.into_iter().map(decode).collect::<Result<Vec<_>, _>>()?;
        Ok((runs, total))
    }
}
