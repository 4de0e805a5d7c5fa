//! `SeaORM` entities of the closure schema.

pub mod chart_accounts;
pub mod closure_runs;
pub mod depreciation_schedule;
pub mod exchange_rates;
pub mod fiscal_period_locks;
pub mod foreign_currency_balances;
pub mod journal_lines;
pub mod journal_postings;
pub mod vat_settings;
