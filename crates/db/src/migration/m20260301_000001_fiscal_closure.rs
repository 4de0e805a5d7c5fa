//! Fiscal closure schema.
//!
//! Creates the ledger tables the closure posts to and reads from, the
//! satellite registers (depreciation, foreign balances, rates, VAT) and the
//! period lock and run history tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(CLOSURE_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(
            "DROP TABLE IF EXISTS closure_runs, fiscal_period_locks, vat_settings, \
             exchange_rates, foreign_currency_balances, depreciation_schedule, \
             journal_lines, journal_postings, chart_accounts CASCADE;",
        )
        .await?;
        Ok(())
    }
}

const CLOSURE_SQL: &str = r"
-- Chart of accounts, per company
CREATE TABLE chart_accounts (
    company_id UUID NOT NULL,
    code VARCHAR(20) NOT NULL,
    name VARCHAR(255) NOT NULL,
    function VARCHAR(20) NOT NULL
        CHECK (function IN ('active', 'passive', 'bifunctional', 'off_balance')),
    PRIMARY KEY (company_id, code)
);

-- Journal postings; month 0 marks a year-end posting
CREATE TABLE journal_postings (
    id UUID PRIMARY KEY,
    company_id UUID NOT NULL,
    year INTEGER NOT NULL,
    month SMALLINT NOT NULL CHECK (month BETWEEN 0 AND 12),
    entry_date DATE NOT NULL,
    source VARCHAR(64) NOT NULL,
    description TEXT NOT NULL,
    closure_run_id UUID NOT NULL,
    total NUMERIC(20, 4) NOT NULL CHECK (total >= 0),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_journal_postings_company_date ON journal_postings(company_id, entry_date);
CREATE INDEX idx_journal_postings_run ON journal_postings(closure_run_id);

CREATE TABLE journal_lines (
    id UUID PRIMARY KEY,
    posting_id UUID NOT NULL REFERENCES journal_postings(id) ON DELETE CASCADE,
    line_no INTEGER NOT NULL,
    account_code VARCHAR(20) NOT NULL,
    debit NUMERIC(20, 4) NOT NULL DEFAULT 0 CHECK (debit >= 0),
    credit NUMERIC(20, 4) NOT NULL DEFAULT 0 CHECK (credit >= 0),
    description TEXT,
    CONSTRAINT chk_one_side CHECK ((debit = 0) <> (credit = 0)),
    UNIQUE (posting_id, line_no)
);

CREATE INDEX idx_journal_lines_account ON journal_lines(account_code);

-- Monthly depreciation schedule from the fixed-asset register
CREATE TABLE depreciation_schedule (
    id UUID PRIMARY KEY,
    company_id UUID NOT NULL,
    asset_id UUID NOT NULL,
    asset_name VARCHAR(255) NOT NULL,
    asset_class VARCHAR(20) NOT NULL,
    expense_account VARCHAR(20),
    year INTEGER NOT NULL,
    month SMALLINT NOT NULL CHECK (month BETWEEN 1 AND 12),
    amount NUMERIC(20, 4) NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT true,
    UNIQUE (company_id, asset_id, year, month)
);

-- Foreign-currency monetary balances, snapshotted by date
CREATE TABLE foreign_currency_balances (
    id UUID PRIMARY KEY,
    company_id UUID NOT NULL,
    account_code VARCHAR(20) NOT NULL,
    currency CHAR(3) NOT NULL,
    foreign_amount NUMERIC(20, 4) NOT NULL,
    carrying_amount NUMERIC(20, 4) NOT NULL,
    normal_side VARCHAR(6) NOT NULL CHECK (normal_side IN ('debit', 'credit')),
    as_of DATE NOT NULL
);

CREATE INDEX idx_fx_balances_company ON foreign_currency_balances(company_id, as_of DESC);

-- Closing rates into the functional currency
CREATE TABLE exchange_rates (
    currency CHAR(3) NOT NULL,
    effective_date DATE NOT NULL,
    rate NUMERIC(20, 10) NOT NULL CHECK (rate > 0),
    PRIMARY KEY (currency, effective_date)
);

CREATE TABLE vat_settings (
    company_id UUID PRIMARY KEY,
    is_vat_payer BOOLEAN NOT NULL,
    cadence VARCHAR(10) NOT NULL CHECK (cadence IN ('monthly', 'quarterly'))
);

-- One row per locked period; month 0 locks the fiscal year
CREATE TABLE fiscal_period_locks (
    id UUID PRIMARY KEY,
    company_id UUID NOT NULL,
    year INTEGER NOT NULL,
    month SMALLINT NOT NULL CHECK (month BETWEEN 0 AND 12),
    locked_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    locked_by_run UUID NOT NULL,
    locked_by UUID,
    UNIQUE (company_id, year, month)
);

CREATE TABLE closure_runs (
    id UUID PRIMARY KEY,
    company_id UUID NOT NULL,
    year INTEGER NOT NULL,
    month SMALLINT NOT NULL CHECK (month BETWEEN 0 AND 12),
    mode VARCHAR(10) NOT NULL,
    status VARCHAR(20) NOT NULL,
    requested_by UUID,
    started_at TIMESTAMPTZ NOT NULL,
    finished_at TIMESTAMPTZ,
    run JSONB NOT NULL
);

CREATE INDEX idx_closure_runs_company ON closure_runs(company_id, started_at DESC);
";
