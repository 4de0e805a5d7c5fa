//! Fiscal periods, date ranges and the period lock seam.

pub mod lock;
pub mod period;

pub use lock::{LockOutcome, LockStoreError, PeriodLock, PeriodLockStore};
pub use period::{
    DateRange, FiscalPeriod, MAX_YEAR, MIN_YEAR, PeriodError, PeriodKey, PeriodKind,
    last_day_of_month,
};
