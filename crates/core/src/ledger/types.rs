//! Journal posting types.

use chrono::NaiveDate;
use closure_shared::types::{ClosureRunId, CompanyId, PostingId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::balance::AccountBalance;
use crate::fiscal::PeriodKey;

/// Entry type: either Debit or Credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Debit entry.
    Debit,
    /// Credit entry.
    Credit,
}

impl EntryType {
    /// The other side.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Debit => Self::Credit,
            Self::Credit => Self::Debit,
        }
    }
}

/// One line of a journal posting. Exactly one of `debit` and `credit` is non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalLine {
    /// Chart of accounts code, e.g. "6811".
    pub account_code: String,
    /// Debit amount.
    pub debit: Decimal,
    /// Credit amount.
    pub credit: Decimal,
    /// Optional line narrative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl JournalLine {
    /// A debit line.
    #[must_use]
    pub fn debit(account_code: impl Into<String>, amount: Decimal) -> Self {
        Self {
            account_code: account_code.into(),
            debit: amount,
            credit: Decimal::ZERO,
            description: None,
        }
    }

    /// A credit line.
    #[must_use]
    pub fn credit(account_code: impl Into<String>, amount: Decimal) -> Self {
        Self {
            account_code: account_code.into(),
            debit: Decimal::ZERO,
            credit: amount,
            description: None,
        }
    }

    /// A line on the given side.
    #[must_use]
    pub fn on_side(side: EntryType, account_code: impl Into<String>, amount: Decimal) -> Self {
        match side {
            EntryType::Debit => Self::debit(account_code, amount),
            EntryType::Credit => Self::credit(account_code, amount),
        }
    }

    /// The line that brings `balance` to zero, `None` if it is already zero.
    #[must_use]
    pub fn closing(balance: &AccountBalance) -> Option<Self> {
        let net = balance.debit_total - balance.credit_total;
        if net > Decimal::ZERO {
            Some(Self::credit(balance.account_code.clone(), net))
        } else if net < Decimal::ZERO {
            Some(Self::debit(balance.account_code.clone(), -net))
        } else {
            None
        }
    }

    /// Attaches a narrative.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Debit or credit, by whichever amount is set.
    #[must_use]
    pub fn side(&self) -> EntryType {
        if self.debit > Decimal::ZERO {
            EntryType::Debit
        } else {
            EntryType::Credit
        }
    }
}

/// A balanced journal entry produced by a closure step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalPosting {
    /// Owning company.
    pub company_id: CompanyId,
    /// Period the entry belongs to.
    pub period: PeriodKey,
    /// Accounting date, the last day of the period.
    pub entry_date: NaiveDate,
    /// Source tag, e.g. "closure:depreciation".
    pub source: String,
    /// Entry narrative.
    pub description: String,
    /// Run that produced the entry.
    pub closure_run_id: ClosureRunId,
    /// Entry lines.
    pub lines: Vec<JournalLine>,
}

impl JournalPosting {
    /// Sum of debits and credits.
    #[must_use]
    pub fn totals(&self) -> PostingTotals {
        let (debit, credit) = self
            .lines
            .iter()
            .fold((Decimal::ZERO, Decimal::ZERO), |(debit, credit), line| {
                (debit + line.debit, credit + line.credit)
            });
        PostingTotals::new(debit, credit)
    }
}

/// Debit and credit totals of a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostingTotals {
    /// Total debits.
    pub debit: Decimal,
    /// Total credits.
    pub credit: Decimal,
    /// Whether debits equal credits.
    pub is_balanced: bool,
}

impl PostingTotals {
    /// Creates totals and computes the balance flag.
    #[must_use]
    pub fn new(debit: Decimal, credit: Decimal) -> Self {
        Self {
            debit,
            credit,
            is_balanced: debit == credit,
        }
    }

    /// Debits minus credits.
    #[must_use]
    pub fn difference(&self) -> Decimal {
        self.debit - self.credit
    }
}

/// Reference to a journal entry accepted by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostingReference {
    /// Ledger identifier of the entry.
    pub posting_id: PostingId,
    /// Source tag of the entry.
    pub source: String,
    /// Accounting date.
    pub entry_date: NaiveDate,
    /// Total debits (equal to total credits).
    pub amount: Decimal,
}
