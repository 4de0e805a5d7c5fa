//! Monthly depreciation of fixed assets.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{StepExecutor, StepFigures, StepInput, StepOutput};
use crate::closure::error::ClosureError;
use crate::closure::sources::DepreciationLine;
use crate::closure::types::StepId;
use crate::currency::CurrencyService;
use crate::ledger::JournalLine;

/// Depreciation booked against one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDepreciation {
    /// Account code.
    pub account_code: String,
    /// Amount for the month.
    pub amount: Decimal,
    /// Number of assets contributing.
    pub asset_count: usize,
}

/// Depreciation totals of a month.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepreciationFigures {
    /// Total depreciation.
    pub total: Decimal,
    /// Credit side, one entry per asset class.
    pub by_asset_class: Vec<AccountDepreciation>,
    /// Debit side, one entry per expense account.
    pub by_expense_account: Vec<AccountDepreciation>,
}

fn accumulate(totals: &mut BTreeMap<String, (Decimal, usize)>, account: &str, amount: Decimal) {
    let entry = totals.entry(account.to_string()).or_default();
    entry.0 += amount;
    entry.1 += 1;
}

fn flatten(totals: BTreeMap<String, (Decimal, usize)>) -> Vec<AccountDepreciation> {
    totals
        .into_iter()
        .map(|(account_code, (amount, asset_count))| AccountDepreciation {
            account_code,
            amount,
            asset_count,
        })
        .collect()
}

/// Sums the schedule of active assets per asset class and per expense account.
///
/// Each asset's amount is rounded to cents before summing, so both sides
/// of the posting add up to the same total.
pub fn summarize_depreciation(
    schedule: &[DepreciationLine],
    default_expense_account: &str,
) -> Result<DepreciationFigures, ClosureError> {
    let mut by_class = BTreeMap::new();
    let mut by_expense = BTreeMap::new();
    let mut total = Decimal::ZERO;

    for line in schedule.iter().filter(|line| line.is_active) {
        if line.amount < Decimal::ZERO {
            return Err(ClosureError::NegativeDepreciation {
                asset: line.asset_name.clone(),
                amount: line.amount,
            });
        }
        let amount = CurrencyService::round_money(line.amount);
        if amount.is_zero() {
            continue;
        }
        let expense_account = line
            .expense_account
            .as_deref()
            .unwrap_or(default_expense_account);
        accumulate(&mut by_class, &line.asset_class, amount);
        accumulate(&mut by_expense, expense_account, amount);
        total += amount;
    }

    Ok(DepreciationFigures {
        total,
        by_asset_class: flatten(by_class),
        by_expense_account: flatten(by_expense),
    })
}

fn depreciation_lines(figures: &DepreciationFigures) -> Vec<JournalLine> {
    let debits = figures
        .by_expense_account
        .iter()
        .map(|expense| JournalLine::debit(&expense.account_code, expense.amount));
    let credits = figures
        .by_asset_class
        .iter()
        .map(|class| JournalLine::credit(&class.account_code, class.amount));
    debits.chain(credits).collect()
}

/// Books the month's scheduled depreciation.
pub struct DepreciationCalculator;

#[async_trait]
impl StepExecutor for DepreciationCalculator {
    async fn execute(&self, input: &StepInput<'_>) -> Result<StepOutput, ClosureError> {
        let period = input.request.period;
        let month = input.month()?;
        let schedule = input
            .sources
            .assets
            .scheduled_depreciation(period.company_id, period.year, month)
            .await
            .map_err(|err| ClosureError::unavailable("fixed asset register", err))?;

        let figures =
            summarize_depreciation(&schedule, &input.settings.accounts.depreciation_expense)?;
        if figures.total.is_zero() {
            return Ok(StepOutput::new(StepFigures::Depreciation(figures))
                .with_warning(format!("no depreciation scheduled for active assets in {period}")));
        }

        let posting = input.posting(
            StepId::Depreciation,
            format!("Depreciation {period}"),
            depreciation_lines(&figures),
        )?;
        Ok(StepOutput::new(StepFigures::Depreciation(figures)).with_posting(posting))
    }
}
