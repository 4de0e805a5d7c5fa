//! VAT settlement: nets collected against deductible VAT.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{StepExecutor, StepFigures, StepInput, StepOutput};
use crate::closure::error::ClosureError;
use crate::closure::settings::AccountMap;
use crate::closure::sources::VatCadence;
use crate::closure::types::StepId;
use crate::fiscal::{DateRange, PeriodError};
use crate::ledger::{AccountBalance, JournalLine};

/// VAT position of the settlement period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VatSettlementFigures {
    /// Whether the company is registered for VAT.
    pub is_vat_payer: bool,
    /// Settlement cadence.
    pub cadence: VatCadence,
    /// Whether this month settles VAT.
    pub settled: bool,
    /// Dates covered by the settlement.
    pub range: Option<DateRange>,
    /// Credit balance of the VAT collected account.
    pub vat_collected: Decimal,
    /// Debit balance of the VAT deductible account.
    pub vat_deductible: Decimal,
    /// VAT owed to the state.
    pub vat_payable: Decimal,
    /// VAT to recover from the state.
    pub vat_receivable: Decimal,
}

impl VatSettlementFigures {
    fn unsettled(is_vat_payer: bool, cadence: VatCadence) -> Self {
        Self {
            is_vat_payer,
            cadence,
            settled: false,
            range: None,
            vat_collected: Decimal::ZERO,
            vat_deductible: Decimal::ZERO,
            vat_payable: Decimal::ZERO,
            vat_receivable: Decimal::ZERO,
        }
    }
}

/// Dates settled in `month`, `None` when a quarterly payer is mid-quarter.
pub fn settlement_range(
    cadence: VatCadence,
    year: i32,
    month: u32,
) -> Result<Option<DateRange>, PeriodError> {
    match cadence {
        VatCadence::Monthly => DateRange::month(year, month).map(Some),
        VatCadence::Quarterly if month % 3 == 0 => DateRange::months(year, month - 2, month).map(Some),
        VatCadence::Quarterly => Ok(None),
    }
}

fn sum_account(balances: &[AccountBalance], code: &str) -> AccountBalance {
    balances
        .iter()
        .filter(|balance| balance.account_code == code)
        .fold(AccountBalance::new(code, Decimal::ZERO, Decimal::ZERO), |mut total, balance| {
            total.add_debit(balance.debit_total);
            total.add_credit(balance.credit_total);
            total
        })
}

/// Closes the VAT accounts into payable or receivable.
fn settlement_lines(
    collected: &AccountBalance,
    deductible: &AccountBalance,
    accounts: &AccountMap,
) -> (Vec<JournalLine>, Decimal) {
    let net = collected.net_credit() - deductible.net_debit();
    let mut lines: Vec<JournalLine> = [collected, deductible]
        .into_iter()
        .filter_map(JournalLine::closing)
        .collect();
    if net > Decimal::ZERO {
        lines.push(JournalLine::credit(&accounts.vat_payable, net));
    } else if net < Decimal::ZERO {
        lines.push(JournalLine::debit(&accounts.vat_receivable, -net));
    }
    (lines, net)
}

/// Settles VAT for the month or, for quarterly payers, the quarter.
pub struct VatSettlementEngine;

#[async_trait]
impl StepExecutor for VatSettlementEngine {
    async fn execute(&self, input: &StepInput<'_>) -> Result<StepOutput, ClosureError> {
        let period = input.request.period;
        let month = input.month()?;
        let settings = input
            .sources
            .vat_settings
            .settings(period.company_id)
            .await
            .map_err(|err| ClosureError::unavailable("VAT settings", err))?;

        if !settings.is_vat_payer {
            return Ok(StepOutput::new(StepFigures::VatSettlement(
                VatSettlementFigures::unsettled(false, settings.cadence),
            ))
            .with_warning("company is not registered for VAT; nothing to settle"));
        }

        let Some(range) = settlement_range(settings.cadence, period.year, month)? else {
            let quarter_end = month.div_ceil(3) * 3;
            return Ok(StepOutput::new(StepFigures::VatSettlement(
                VatSettlementFigures::unsettled(true, settings.cadence),
            ))
            .with_warning(format!(
                "quarterly VAT payer: settlement deferred to month {quarter_end}"
            )));
        };

        let balances = input
            .sources
            .ledger
            .balances(
                period.company_id,
                range,
                &[StepId::VatSettlement.posting_source()],
            )
            .await
            .map_err(|err| ClosureError::unavailable("account ledger", err))?;
        let accounts = &input.settings.accounts;
        let collected = sum_account(&balances, &accounts.vat_collected);
        let deductible = sum_account(&balances, &accounts.vat_deductible);
        let (lines, net) = settlement_lines(&collected, &deductible, accounts);

        let figures = VatSettlementFigures {
            is_vat_payer: true,
            cadence: settings.cadence,
            settled: true,
            range: Some(range),
            vat_collected: collected.net_credit(),
            vat_deductible: deductible.net_debit(),
            vat_payable: net.max(Decimal::ZERO),
            vat_receivable: (-net).max(Decimal::ZERO),
        };

        if lines.len() < 2 {
            return Ok(StepOutput::new(StepFigures::VatSettlement(figures))
                .with_warning(format!("no VAT balances between {} and {}", range.start, range.end)));
        }

        let posting = input.posting(
            StepId::VatSettlement,
            format!("VAT settlement {} to {}", range.start, range.end),
            lines,
        )?;
        Ok(StepOutput::new(StepFigures::VatSettlement(figures)).with_posting(posting))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::closure::memory::fixtures::StepHarness;
    use crate::closure::sources::VatSettings;
    use crate::ledger::validate_posting;
    use chrono::NaiveDate;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, month, day).unwrap()
    }

    #[rstest]
    #[case(VatCadence::Monthly, 5, Some((5, 5)))]
    #[case(VatCadence::Quarterly, 3, Some((1, 3)))]
    #[case(VatCadence::Quarterly, 12, Some((10, 12)))]
    #[case(VatCadence::Quarterly, 4, None)]
    #[case(VatCadence::Quarterly, 8, None)]
    fn test_settlement_range(
        #[case] cadence: VatCadence,
        #[case] month: u32,
        #[case] expected: Option<(u32, u32)>,
    ) {
        let range = settlement_range(cadence, 2025, month).unwrap();
        let expected = expected.map(|(first, last)| DateRange::months(2025, first, last).unwrap());
        assert_eq!(range, expected);
    }

    #[test]
    fn test_net_payable() {
        let collected = AccountBalance::new("4427", dec!(0), dec!(1900));
        let deductible = AccountBalance::new("4426", dec!(700), dec!(0));
        let (lines, net) = settlement_lines(&collected, &deductible, &AccountMap::default());
        assert_eq!(net, dec!(1200));
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], JournalLine::credit("4423", dec!(1200)));
    }

    #[test]
    fn test_net_receivable() {
        let collected = AccountBalance::new("4427", dec!(0), dec!(300));
        let deductible = AccountBalance::new("4426", dec!(1000), dec!(0));
        let (lines, net) = settlement_lines(&collected, &deductible, &AccountMap::default());
        assert_eq!(net, dec!(-700));
        assert_eq!(lines[2], JournalLine::debit("4424", dec!(700)));
    }

    #[tokio::test]
    async fn test_quarterly_payer_settles_whole_quarter() {
        let harness = StepHarness::monthly(2025, 6);
        let company_id = harness.company_id();
        harness.books.set_vat_settings(
            company_id,
            VatSettings {
                is_vat_payer: true,
                cadence: VatCadence::Quarterly,
            },
        );
        harness.books.record_movement(company_id, date(4, 10), "4427", dec!(0), dec!(500));
        harness.books.record_movement(company_id, date(6, 20), "4427", dec!(0), dec!(400));
        harness.books.record_movement(company_id, date(5, 2), "4426", dec!(300), dec!(0));
        harness.books.record_movement(company_id, date(7, 1), "4427", dec!(0), dec!(999));

        let output = VatSettlementEngine.execute(&harness.input()).await.unwrap();

        let StepFigures::VatSettlement(figures) = &output.figures else {
            panic!("unexpected figures {:?}", output.figures);
        };
        assert!(figures.settled);
        assert_eq!(figures.vat_collected, dec!(900));
        assert_eq!(figures.vat_payable, dec!(600));
        assert_eq!(validate_posting(&output.postings[0]).unwrap().debit, dec!(900));
    }

    #[tokio::test]
    async fn test_quarterly_payer_mid_quarter_defers() {
        let harness = StepHarness::monthly(2025, 5);
        harness.books.set_vat_settings(
            harness.company_id(),
            VatSettings {
                is_vat_payer: true,
                cadence: VatCadence::Quarterly,
            },
        );
        let output = VatSettlementEngine.execute(&harness.input()).await.unwrap();
        assert!(output.postings.is_empty());
        assert_eq!(
            output.warnings,
            vec!["quarterly VAT payer: settlement deferred to month 6".to_string()]
        );
    }

    #[tokio::test]
    async fn test_non_payer_warns() {
        let harness = StepHarness::monthly(2025, 5);
        harness.books.set_vat_settings(
            harness.company_id(),
            VatSettings {
                is_vat_payer: false,
                cadence: VatCadence::Monthly,
            },
        );
        let output = VatSettlementEngine.execute(&harness.input()).await.unwrap();
        assert!(output.postings.is_empty());
        assert_eq!(output.warnings.len(), 1);
    }
}
