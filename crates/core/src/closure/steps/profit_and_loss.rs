//! Year-end closing of revenue and expense accounts into profit and loss.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{StepExecutor, StepFigures, StepInput, StepOutput};
use crate::closure::error::ClosureError;
use crate::closure::types::StepId;
use crate::ledger::balance::account_class;
use crate::ledger::{AccountBalance, JournalLine};

const EXPENSE_CLASS: u8 = 6;
const REVENUE_CLASS: u8 = 7;

/// Revenue, expenses and accounting profit of the year.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitAndLossFigures {
    /// Class 7 turnover, credit minus debit.
    pub total_revenue: Decimal,
    /// Class 6 turnover, debit minus credit.
    pub total_expenses: Decimal,
    /// totalRevenue - totalExpenses.
    pub accounting_profit: Decimal,
    /// Accounts zeroed by the closing entry.
    pub accounts_closed: usize,
}

/// Closes class 6 and class 7 balances against `pl_account`.
///
/// `balances` pairs each balance with its account class.
#[must_use]
pub fn close_profit_and_loss(
    balances: &[(AccountBalance, u8)],
    pl_account: &str,
) -> (ProfitAndLossFigures, Vec<JournalLine>) {
    let mut total_revenue = Decimal::ZERO;
    let mut total_expenses = Decimal::ZERO;
    let mut lines = Vec::new();

    for (balance, class) in balances {
        match *class {
            REVENUE_CLASS => total_revenue += balance.net_credit(),
            EXPENSE_CLASS => total_expenses += balance.net_debit(),
            _ => continue,
        }
        lines.extend(JournalLine::closing(balance));
    }

    let accounting_profit = total_revenue - total_expenses;
    let accounts_closed = lines.len();
    if accounting_profit > Decimal::ZERO {
        lines.push(JournalLine::credit(pl_account, accounting_profit));
    } else if accounting_profit < Decimal::ZERO {
        lines.push(JournalLine::debit(pl_account, -accounting_profit));
    }

    (
        ProfitAndLossFigures {
            total_revenue,
            total_expenses,
            accounting_profit,
            accounts_closed,
        },
        lines,
    )
}

/// Sources of the year-end closing entries. Turnover is read without them so
/// the figures stay the same once the year, or part of it, has been closed.
#[must_use]
pub fn closing_sources() -> Vec<String> {
    StepId::YEAR_END_CLOSING
        .iter()
        .map(|step| step.posting_source())
        .collect()
}

/// Zeroes revenue and expense accounts into profit and loss.
pub struct ProfitAndLossClosure;

#[async_trait]
impl StepExecutor for ProfitAndLossClosure {
    async fn execute(&self, input: &StepInput<'_>) -> Result<StepOutput, ClosureError> {
        let period = input.request.period;
        let balances = input
            .sources
            .ledger
            .balances(period.company_id, period.date_range()?, &closing_sources())
            .await
            .map_err(|err| ClosureError::unavailable("account ledger", err))?;

        let mut warnings = Vec::new();
        let mut classified = Vec::with_capacity(balances.len());
        for balance in balances {
            let charted = input
                .sources
                .chart
                .account(period.company_id, &balance.account_code)
                .await
                .map_err(|err| ClosureError::unavailable("chart of accounts", err))?;
            let class = match charted {
                Some(account) => account.class,
                None => {
                    let class = account_class(&balance.account_code).ok_or_else(|| {
                        ClosureError::Calculation(format!(
                            "account {} is not in the chart of accounts and has no class digit",
                            balance.account_code
                        ))
                    })?;
                    if matches!(class, EXPENSE_CLASS | REVENUE_CLASS) {
                        warnings.push(format!(
                            "account {} is not in the chart of accounts; classified as class {class}",
                            balance.account_code
                        ));
                    }
                    class
                }
            };
            classified.push((balance, class));
        }

        let (figures, lines) =
            close_profit_and_loss(&classified, &input.settings.accounts.profit_and_loss);
        let mut output = StepOutput::new(StepFigures::ProfitAndLoss(figures));
        output.warnings = warnings;

        if lines.len() < 2 {
            return Ok(output.with_warning(format!("no revenue or expense balances in {period}")));
        }
        let posting = input.posting(
            StepId::ProfitAndLoss,
            format!("Closing of revenue and expense accounts {period}"),
            lines,
        )?;
        Ok(output.with_posting(posting))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::closure::memory::fixtures::StepHarness;
    use crate::ledger::{LedgerPostingGateway, validate_posting};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn test_closing_lines_balance() {
        let balances = vec![
            (AccountBalance::new("707", dec!(0), dec!(500000)), 7),
            (AccountBalance::new("607", dec!(300000), dec!(0)), 6),
            (AccountBalance::new("641", dec!(50000), dec!(0)), 6),
            (AccountBalance::new("4111", dec!(100), dec!(0)), 4),
        ];
        let (figures, lines) = close_profit_and_loss(&balances, "121");

        assert_eq!(figures.total_revenue, dec!(500000));
        assert_eq!(figures.total_expenses, dec!(350000));
        assert_eq!(figures.accounting_profit, dec!(150000));
        assert_eq!(figures.accounts_closed, 3);
        assert_eq!(lines.last(), Some(&JournalLine::credit("121", dec!(150000))));
        let debit: Decimal = lines.iter().map(|line| line.debit).sum();
        let credit: Decimal = lines.iter().map(|line| line.credit).sum();
        assert_eq!(debit, credit);
    }

    #[test]
    fn test_loss_debits_profit_and_loss() {
        let balances = vec![
            (AccountBalance::new("707", dec!(0), dec!(1000)), 7),
            (AccountBalance::new("628", dec!(1500), dec!(0)), 6),
        ];
        let (figures, lines) = close_profit_and_loss(&balances, "121");
        assert_eq!(figures.accounting_profit, dec!(-500));
        assert_eq!(lines.last(), Some(&JournalLine::debit("121", dec!(500))));
    }

    #[tokio::test]
    async fn test_unknown_account_falls_back_to_class_digit() {
        let harness = StepHarness::annual(2025);
        let company_id = harness.company_id();
        let date = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        harness.books.record_movement(company_id, date, "707", dec!(0), dec!(1000));
        harness.books.record_movement(company_id, date, "7588", dec!(0), dec!(200));
        harness.books.record_movement(company_id, date, "607", dec!(400), dec!(0));

        let output = ProfitAndLossClosure.execute(&harness.input()).await.unwrap();

        let StepFigures::ProfitAndLoss(figures) = &output.figures else {
            panic!("unexpected figures {:?}", output.figures);
        };
        assert_eq!(figures.total_revenue, dec!(1200));
        assert_eq!(figures.accounting_profit, dec!(800));
        assert_eq!(output.warnings.len(), 1);
        assert!(output.warnings[0].contains("7588"));
        assert_eq!(validate_posting(&output.postings[0]).unwrap().debit, dec!(1200));
        assert_eq!(output.postings[0].entry_date.to_string(), "2025-12-31");
    }

    #[tokio::test]
    async fn test_figures_ignore_posted_closing_entry() {
        let harness = StepHarness::annual(2025);
        let company_id = harness.company_id();
        let date = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        harness.books.record_movement(company_id, date, "707", dec!(0), dec!(500000));
        harness.books.record_movement(company_id, date, "607", dec!(350000), dec!(0));

        let first = ProfitAndLossClosure.execute(&harness.input()).await.unwrap();
        harness.books.post(&first.postings[0]).await.unwrap();
        let again = ProfitAndLossClosure.execute(&harness.input()).await.unwrap();

        assert_eq!(again.figures, first.figures);
        assert_eq!(again.postings, first.postings);
    }

    #[tokio::test]
    async fn test_empty_year_warns() {
        let harness = StepHarness::annual(2025);
        let output = ProfitAndLossClosure.execute(&harness.input()).await.unwrap();
        assert!(output.postings.is_empty());
        assert_eq!(output.warnings.len(), 1);
    }
}
