//! Period lock manager: the final step of every run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use closure_shared::types::{ClosureRunId, CompanyId};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::ClosureError;
use super::options::ClosureRequest;
use super::steps::{StepFigures, StepOutput};
use crate::fiscal::{FiscalPeriod, LockOutcome, PeriodKey, PeriodLock, PeriodLockStore};

/// Lock state reported by the lock step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockFigures {
    /// Whether this run locked the period.
    pub locked: bool,
    /// Whether the period was locked before the run.
    pub already_locked: bool,
    /// Lock timestamp.
    pub locked_at: Option<DateTime<Utc>>,
}

/// Reads and sets period locks.
#[derive(Clone)]
pub struct PeriodLockManager {
    store: Arc<dyn PeriodLockStore>,
}

impl PeriodLockManager {
    /// Creates a manager over a lock store.
    #[must_use]
    pub fn new(store: Arc<dyn PeriodLockStore>) -> Self {
        Self { store }
    }

    /// Current state, unlocked when never recorded.
    pub async fn period(&self, key: &PeriodKey) -> Result<FiscalPeriod, ClosureError> {
        Ok(self
            .store
            .find(key)
            .await?
            .unwrap_or_else(|| FiscalPeriod::open(*key)))
    }

    /// Months of `year` not yet locked.
    pub async fn open_months(
        &self,
        company_id: CompanyId,
        year: i32,
    ) -> Result<Vec<u32>, ClosureError> {
        let locked = self.store.locked_months(company_id, year).await?;
        Ok((1..=12).filter(|month| !locked.contains(month)).collect())
    }

    /// Locks the period. Fails if it is already locked, including when a
    /// concurrent run got there first.
    pub async fn lock(
        &self,
        key: &PeriodKey,
        run_id: ClosureRunId,
        request: &ClosureRequest,
    ) -> Result<FiscalPeriod, ClosureError> {
        let lock = PeriodLock {
            run_id,
            locked_by: request.requested_by,
            locked_at: Utc::now(),
        };
        match self.store.lock_if_unlocked(key, lock).await? {
            LockOutcome::Locked(period) => {
                info!(period = %key, run_id = %run_id, "Fiscal period locked");
                Ok(period)
            }
            LockOutcome::AlreadyLocked(_) => Err(ClosureError::AlreadyLocked(key.to_string())),
        }
    }

    /// Runs the lock step: locks in a commit, reports what would happen in a dry run.
    pub async fn run_step(
        &self,
        request: &ClosureRequest,
        run_id: ClosureRunId,
    ) -> Result<StepOutput, ClosureError> {
        let key = request.period;
        if request.mode.is_commit() {
            let period = self.lock(&key, run_id, request).await?;
            return Ok(StepOutput::new(StepFigures::PeriodLock(LockFigures {
                locked: true,
                already_locked: false,
                locked_at: period.locked_at,
            })));
        }

        let period = self.period(&key).await?;
        let figures = StepFigures::PeriodLock(LockFigures {
            locked: false,
            already_locked: period.is_locked(),
            locked_at: period.locked_at,
        });
        let output = StepOutput::new(figures);
        Ok(if period.is_locked() {
            output.with_warning(format!("period {key} is already locked"))
        } else {
            output.with_warning(format!("dry run: period {key} was not locked"))
        })
    }
}
