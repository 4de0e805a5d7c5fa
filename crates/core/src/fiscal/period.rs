//! Fiscal period types.
//!
//! A period is either a calendar month or a full calendar year of one company.
//! The fiscal year is the calendar year, as required for Romanian statutory books.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use closure_shared::types::{ClosureRunId, CompanyId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Earliest accepted fiscal year.
pub const MIN_YEAR: i32 = 1900;
/// Latest accepted fiscal year.
pub const MAX_YEAR: i32 = 9999;

/// Invalid period coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    /// Month outside 1-12.
    #[error("Month must be between 1 and 12, got {0}")]
    InvalidMonth(u32),

    /// Year outside the accepted range.
    #[error("Year must be between {MIN_YEAR} and {MAX_YEAR}, got {0}")]
    InvalidYear(i32),
}

/// Monthly or annual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    /// A single calendar month.
    Monthly,
    /// A calendar year.
    Annual,
}

/// Identifies a fiscal period: `(company, year, month)` for a month,
/// `(company, year)` for a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodKey {
    /// Owning company.
    pub company_id: CompanyId,
    /// Calendar year.
    pub year: i32,
    /// Month (1-12) for monthly periods, `None` for the year.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
}

impl PeriodKey {
    /// Key of a monthly period.
    #[must_use]
    pub const fn monthly(company_id: CompanyId, year: i32, month: u32) -> Self {
        Self {
            company_id,
            year,
            month: Some(month),
        }
    }

    /// Key of an annual period.
    #[must_use]
    pub const fn annual(company_id: CompanyId, year: i32) -> Self {
        Self {
            company_id,
            year,
            month: None,
        }
    }

    /// Monthly or annual.
    #[must_use]
    pub const fn kind(&self) -> PeriodKind {
        match self.month {
            Some(_) => PeriodKind::Monthly,
            None => PeriodKind::Annual,
        }
    }

    /// Checks year and month bounds.
    pub fn validate(&self) -> Result<(), PeriodError> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&self.year) {
            return Err(PeriodError::InvalidYear(self.year));
        }
        if let Some(month) = self.month
            && !(1..=12).contains(&month)
        {
            return Err(PeriodError::InvalidMonth(month));
        }
        Ok(())
    }

    /// Calendar dates covered by the period.
    pub fn date_range(&self) -> Result<DateRange, PeriodError> {
        self.validate()?;
        match self.month {
            Some(month) => DateRange::month(self.year, month),
            None => DateRange::year(self.year),
        }
    }

    /// Last calendar day of the period.
    pub fn end_date(&self) -> Result<NaiveDate, PeriodError> {
        self.date_range().map(|range| range.end)
    }

    /// The annual period containing this one.
    #[must_use]
    pub const fn year_key(&self) -> Self {
        Self::annual(self.company_id, self.year)
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.month {
            Some(month) => write!(f, "{:04}-{month:02}", self.year),
            None => write!(f, "FY{:04}", self.year),
        }
    }
}

/// Inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    /// First day, inclusive.
    pub start: NaiveDate,
    /// Last day, inclusive.
    pub end: NaiveDate,
}

impl DateRange {
    /// The whole of `month` in `year`.
    pub fn month(year: i32, month: u32) -> Result<Self, PeriodError> {
        let start =
            NaiveDate::from_ymd_opt(year, month, 1).ok_or(PeriodError::InvalidMonth(month))?;
        let end = last_day_of_month(year, month)?;
        Ok(Self { start, end })
    }

    /// The months `first..=last` of `year`.
    pub fn months(year: i32, first: u32, last: u32) -> Result<Self, PeriodError> {
        Ok(Self {
            start: Self::month(year, first)?.start,
            end: Self::month(year, last)?.end,
        })
    }

    /// The calendar year.
    pub fn year(year: i32) -> Result<Self, PeriodError> {
        Self::months(year, 1, 12)
    }

    /// Returns true if `date` falls inside the range.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Last day of a calendar month.
pub fn last_day_of_month(year: i32, month: u32) -> Result<NaiveDate, PeriodError> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .ok_or(PeriodError::InvalidMonth(month))
}

/// Lock state of a fiscal period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiscalPeriod {
    /// Which period.
    pub key: PeriodKey,
    /// When the period was locked, if it is.
    pub locked_at: Option<DateTime<Utc>>,
    /// Run that performed the lock.
    pub locked_by_run: Option<ClosureRunId>,
    /// User who requested the locking run.
    pub locked_by: Option<UserId>,
}

impl FiscalPeriod {
    /// An unlocked period.
    #[must_use]
    pub const fn open(key: PeriodKey) -> Self {
        Self {
            key,
            locked_at: None,
            locked_by_run: None,
            locked_by: None,
        }
    }

    /// Returns true if the period refuses new postings.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.locked_at.is_some()
    }

    /// Returns true if `date` falls within this period.
    #[must_use]
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date.year() == self.key.year && self.key.month.is_none_or(|month| date.month() == month)
    }
}
