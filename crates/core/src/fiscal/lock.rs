//! Period lock persistence seam.
//!
//! Locking must be atomic per period: of two concurrent attempts exactly one
//! observes `LockOutcome::Locked`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use closure_shared::types::{ClosureRunId, CompanyId, UserId};
use thiserror::Error;

use super::period::{FiscalPeriod, PeriodKey};

/// Failure of the lock store itself.
#[derive(Debug, Clone, Error)]
#[error("Period lock store error: {0}")]
pub struct LockStoreError(pub String);

/// Who locks a period, and when.
#[derive(Debug, Clone, Copy)]
pub struct PeriodLock {
    /// Run performing the lock.
    pub run_id: ClosureRunId,
    /// Requesting user.
    pub locked_by: Option<UserId>,
    /// Lock timestamp.
    pub locked_at: DateTime<Utc>,
}

/// Result of a compare-and-set lock attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// This attempt locked the period.
    Locked(FiscalPeriod),
    /// The period was locked before this attempt.
    AlreadyLocked(FiscalPeriod),
}

/// Stores the lock state of fiscal periods.
#[async_trait]
pub trait PeriodLockStore: Send + Sync {
    /// Current state of a period, `None` if it was never recorded.
    async fn find(&self, key: &PeriodKey) -> Result<Option<FiscalPeriod>, LockStoreError>;

    /// Locks the period unless it is already locked.
    async fn lock_if_unlocked(
        &self,
        key: &PeriodKey,
        lock: PeriodLock,
    ) -> Result<LockOutcome, LockStoreError>;

    /// Months of `year` that are locked.
    async fn locked_months(
        &self,
        company_id: CompanyId,
        year: i32,
    ) -> Result<Vec<u32>, LockStoreError>;
}
