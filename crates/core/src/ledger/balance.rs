//! Account balances and Romanian chart of accounts classification.
//!
//! The first digit of a Romanian account code is its class:
//! 1 equity and long-term debt, 2 fixed assets, 3 inventories, 4 third parties,
//! 5 treasury, 6 expenses, 7 revenues, 8 and 9 special and management accounts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side on which an account normally carries its balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalSide {
    /// Assets, expenses: balance = debit - credit.
    DebitNormal,
    /// Liabilities, equity, revenue: balance = credit - debit.
    CreditNormal,
}

impl NormalSide {
    /// Signed balance for the given totals.
    #[must_use]
    pub fn balance(self, debit: Decimal, credit: Decimal) -> Decimal {
        match self {
            Self::DebitNormal => debit - credit,
            Self::CreditNormal => credit - debit,
        }
    }
}

/// Accounting function of an account (A / P / B in the Romanian chart).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountFunction {
    /// Asset or expense (A).
    Active,
    /// Liability, equity or revenue (P).
    Passive,
    /// May carry either balance (B).
    Bifunctional,
    /// Off-balance-sheet (class 8).
    OffBalance,
}

impl AccountFunction {
    /// Default function for an account class digit.
    #[must_use]
    pub const fn from_class(class: u8) -> Option<Self> {
        match class {
            1 | 7 => Some(Self::Passive),
            2 | 3 | 5 | 6 => Some(Self::Active),
            4 | 9 => Some(Self::Bifunctional),
            8 => Some(Self::OffBalance),
            _ => None,
        }
    }

    /// Normal balance side. Bifunctional accounts are read debit-normal.
    #[must_use]
    pub const fn normal_side(self) -> NormalSide {
        match self {
            Self::Passive => NormalSide::CreditNormal,
            Self::Active | Self::Bifunctional | Self::OffBalance => NormalSide::DebitNormal,
        }
    }
}

/// Class digit of an account code, `None` if the code does not start with 1-9.
#[must_use]
pub fn account_class(code: &str) -> Option<u8> {
    let digit = code.trim().chars().next()?.to_digit(10)?;
    u8::try_from(digit).ok().filter(|class| *class > 0)
}

/// An account of the company's chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartAccount {
    /// Account code, e.g. "4427".
    pub code: String,
    /// Account name.
    pub name: String,
    /// Class digit (1-9).
    pub class: u8,
    /// Accounting function.
    pub function: AccountFunction,
}

impl ChartAccount {
    /// Creates a chart account, deriving class from the code.
    #[must_use]
    pub fn new(code: impl Into<String>, name: impl Into<String>, function: AccountFunction) -> Self {
        let code = code.into();
        Self {
            class: account_class(&code).unwrap_or_default(),
            code,
            name: name.into(),
            function,
        }
    }

    /// Class 6.
    #[must_use]
    pub const fn is_expense(&self) -> bool {
        self.class == 6
    }

    /// Class 7.
    #[must_use]
    pub const fn is_revenue(&self) -> bool {
        self.class == 7
    }
}

/// Debit and credit turnover of one account over a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    /// Account code.
    pub account_code: String,
    /// Total debit amount.
    pub debit_total: Decimal,
    /// Total credit amount.
    pub credit_total: Decimal,
}

impl AccountBalance {
    /// Creates a balance from totals.
    #[must_use]
    pub fn new(account_code: impl Into<String>, debit_total: Decimal, credit_total: Decimal) -> Self {
        Self {
            account_code: account_code.into(),
            debit_total,
            credit_total,
        }
    }

    /// Debit minus credit.
    #[must_use]
    pub fn net_debit(&self) -> Decimal {
        self.debit_total - self.credit_total
    }

    /// Credit minus debit.
    #[must_use]
    pub fn net_credit(&self) -> Decimal {
        self.credit_total - self.debit_total
    }

    /// Adds a debit amount.
    pub fn add_debit(&mut self, amount: Decimal) {
        self.debit_total += amount;
    }

    /// Adds a credit amount.
    pub fn add_credit(&mut self, amount: Decimal) {
        self.credit_total += amount;
    }
}
