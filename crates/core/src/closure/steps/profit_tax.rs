//! Corporate income tax on the year's profit.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::{StepExecutor, StepFigures, StepInput, StepOutput};
use crate::closure::error::ClosureError;
use crate::closure::options::TaxAdjustments;
use crate::closure::settings::AccountMap;
use crate::closure::types::{ProfitTaxComputation, StepId};
use crate::ledger::JournalLine;

/// Computes profit tax.
///
/// taxableProfit = max(0, accountingProfit + nonDeductibleExpenses
/// - nonTaxableIncome - taxLossCarryforward - otherAdjustments), and
/// profitTaxAmount = taxableProfit x rate. Amounts are exact, not rounded.
///
/// ```
/// use closure_core::closure::options::TaxAdjustments;
/// use closure_core::closure::steps::compute_profit_tax;
/// use rust_decimal_macros::dec;
///
/// let adjustments = TaxAdjustments {
///     non_deductible_expenses: dec!(10000),
///     ..TaxAdjustments::default()
/// };
/// let tax = compute_profit_tax(dec!(150000), &adjustments, dec!(0.16)).unwrap();
/// assert_eq!(tax.taxable_profit, dec!(160000));
/// assert_eq!(tax.profit_tax_amount, dec!(25600));
/// assert_eq!(tax.net_profit, dec!(124400));
/// ```
pub fn compute_profit_tax(
    accounting_profit: Decimal,
    adjustments: &TaxAdjustments,
    rate: Decimal,
) -> Result<ProfitTaxComputation, ClosureError> {
    adjustments.validate()?;
    let adjusted = accounting_profit + adjustments.non_deductible_expenses
        - adjustments.non_taxable_income
        - adjustments.tax_loss_carryforward
        - adjustments.other_adjustments;
    let taxable_profit = adjusted.max(Decimal::ZERO);
    let profit_tax_amount = taxable_profit * rate;
    Ok(ProfitTaxComputation {
        accounting_profit,
        taxable_profit,
        tax_rate: rate,
        profit_tax_amount,
        net_profit: accounting_profit - profit_tax_amount,
    })
}

/// Books the tax expense and closes it into profit and loss.
fn tax_lines(amount: Decimal, accounts: &AccountMap) -> Vec<JournalLine> {
    vec![
        JournalLine::debit(&accounts.profit_tax_expense, amount),
        JournalLine::credit(&accounts.profit_tax_payable, amount),
        JournalLine::debit(&accounts.profit_and_loss, amount),
        JournalLine::credit(&accounts.profit_tax_expense, amount),
    ]
}

/// Applies the profit tax formula to the year's accounting profit.
pub struct ProfitTaxCalculator;

#[async_trait]
impl StepExecutor for ProfitTaxCalculator {
    async fn execute(&self, input: &StepInput<'_>) -> Result<StepOutput, ClosureError> {
        if input.context.profit_and_loss().is_none() {
            return Err(ClosureError::Calculation(
                "profit tax requires the profit and loss figures of the year".to_string(),
            ));
        }
        let adjustments = input.request.options.annual().tax_adjustments;
        let computation = compute_profit_tax(
            input.context.accounting_profit(),
            &adjustments,
            input.settings.profit_tax_rate,
        )?;

        let output = StepOutput::new(StepFigures::ProfitTax(computation));
        if computation.profit_tax_amount.is_zero() {
            return Ok(output.with_warning("taxable profit is zero; no profit tax due"));
        }
        let posting = input.posting(
            StepId::ProfitTax,
            format!("Profit tax {}", input.request.period),
            tax_lines(computation.profit_tax_amount, &input.settings.accounts),
        )?;
        Ok(output.with_posting(posting))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(150000), dec!(10000), dec!(0), dec!(0), dec!(0), dec!(160000), dec!(25600))]
    #[case(dec!(100000), dec!(0), dec!(20000), dec!(30000), dec!(0), dec!(50000), dec!(8000))]
    #[case(dec!(-40000), dec!(5000), dec!(0), dec!(0), dec!(0), dec!(0), dec!(0))]
    #[case(dec!(10000), dec!(0), dec!(0), dec!(8000), dec!(3000), dec!(0), dec!(0))]
    #[case(dec!(1234.56), dec!(0), dec!(0), dec!(0), dec!(0), dec!(1234.56), dec!(197.5296))]
    fn test_formula(
        #[case] profit: Decimal,
        #[case] non_deductible: Decimal,
        #[case] non_taxable: Decimal,
        #[case] carryforward: Decimal,
        #[case] other: Decimal,
        #[case] taxable: Decimal,
        #[case] tax: Decimal,
    ) {
        let adjustments = TaxAdjustments {
            non_deductible_expenses: non_deductible,
            non_taxable_income: non_taxable,
            tax_loss_carryforward: carryforward,
            other_adjustments: other,
        };
        let computation = compute_profit_tax(profit, &adjustments, dec!(0.16)).unwrap();
        assert_eq!(computation.taxable_profit, taxable);
        assert_eq!(computation.profit_tax_amount, tax);
        assert_eq!(computation.net_profit, profit - tax);
    }

    #[test]
    fn test_negative_adjustment_rejected() {
        let adjustments = TaxAdjustments {
            other_adjustments: dec!(-1),
            ..TaxAdjustments::default()
        };
        assert!(matches!(
            compute_profit_tax(dec!(100), &adjustments, dec!(0.16)),
            Err(ClosureError::NegativeInput { field: "otherAdjustments", .. })
        ));
    }

    #[test]
    fn test_tax_lines_balance() {
        let lines = tax_lines(dec!(25600), &AccountMap::default());
        let debit: Decimal = lines.iter().map(|line| line.debit).sum();
        let credit: Decimal = lines.iter().map(|line| line.credit).sum();
        assert_eq!(debit, credit);
        assert_eq!(lines[1], JournalLine::credit("4411", dec!(25600)));
    }

    /// Amounts from -1,000,000.00 to 1,000,000.00.
    fn signed_amount() -> impl Strategy<Value = Decimal> {
        (-100_000_000i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
    }

    /// Amounts from 0.00 to 1,000,000.00.
    fn non_negative_amount() -> impl Strategy<Value = Decimal> {
        (0i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Tax is max(0, adjusted profit) x 16% and never negative.
        #[test]
        fn prop_tax_matches_formula(
            profit in signed_amount(),
            non_deductible in non_negative_amount(),
            non_taxable in non_negative_amount(),
            carryforward in non_negative_amount(),
            other in non_negative_amount(),
        ) {
            let adjustments = TaxAdjustments {
                non_deductible_expenses: non_deductible,
                non_taxable_income: non_taxable,
                tax_loss_carryforward: carryforward,
                other_adjustments: other,
            };
            let computation = compute_profit_tax(profit, &adjustments, dec!(0.16)).unwrap();
            let expected = (profit + non_deductible - non_taxable - carryforward - other)
                .max(Decimal::ZERO) * dec!(0.16);

            prop_assert_eq!(computation.profit_tax_amount, expected);
            prop_assert!(computation.profit_tax_amount >= Decimal::ZERO);
            prop_assert_eq!(computation.net_profit, profit - expected);
        }
    }
}
