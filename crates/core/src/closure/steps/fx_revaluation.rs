//! Month-end revaluation of foreign-currency monetary balances.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{StepExecutor, StepFigures, StepInput, StepOutput};
use crate::closure::error::ClosureError;
use crate::closure::settings::AccountMap;
use crate::closure::sources::ForeignCurrencyBalance;
use crate::closure::types::StepId;
use crate::currency::{CurrencyService, ExchangeRate};
use crate::ledger::{EntryType, JournalLine};

/// Revaluation of one balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revaluation {
    /// Account code.
    pub account_code: String,
    /// Currency code.
    pub currency: String,
    /// Amount in foreign currency.
    pub foreign_amount: Decimal,
    /// Closing rate applied.
    pub rate: Decimal,
    /// Carrying amount before revaluation.
    pub carrying_amount: Decimal,
    /// foreignAmount x rate, rounded to cents.
    pub revalued_amount: Decimal,
    /// revaluedAmount - carryingAmount.
    pub difference: Decimal,
    /// Normal side of the account.
    pub normal_side: EntryType,
}

impl Revaluation {
    /// Gain (positive) or loss (negative) for the company.
    #[must_use]
    pub fn result(&self) -> Decimal {
        match self.normal_side {
            EntryType::Debit => self.difference,
            EntryType::Credit => -self.difference,
        }
    }
}

/// Revaluation totals of a month.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FxRevaluationFigures {
    /// Date of the closing rates.
    pub rate_date: Option<NaiveDate>,
    /// Unrealised gains.
    pub total_gain: Decimal,
    /// Unrealised losses.
    pub total_loss: Decimal,
    /// totalGain - totalLoss.
    pub net_result: Decimal,
    /// Per-balance detail.
    pub revaluations: Vec<Revaluation>,
}

/// Revalues one balance at `rate`.
#[must_use]
pub fn revalue(balance: &ForeignCurrencyBalance, rate: &ExchangeRate) -> Revaluation {
    let revalued_amount = CurrencyService::convert(balance.foreign_amount, rate.rate);
    Revaluation {
        account_code: balance.account_code.clone(),
        currency: balance.currency.clone(),
        foreign_amount: balance.foreign_amount,
        rate: rate.rate,
        carrying_amount: balance.carrying_amount,
        revalued_amount,
        difference: revalued_amount - balance.carrying_amount,
        normal_side: balance.normal_side,
    }
}

/// Totals gains and losses.
#[must_use]
pub fn summarize_revaluations(
    revaluations: Vec<Revaluation>,
    rate_date: NaiveDate,
) -> FxRevaluationFigures {
    let (total_gain, total_loss) =
        revaluations
            .iter()
            .fold((Decimal::ZERO, Decimal::ZERO), |(gain, loss), revaluation| {
                let result = revaluation.result();
                if result > Decimal::ZERO {
                    (gain + result, loss)
                } else {
                    (gain, loss - result)
                }
            });
    FxRevaluationFigures {
        rate_date: Some(rate_date),
        total_gain,
        total_loss,
        net_result: total_gain - total_loss,
        revaluations,
    }
}

fn revaluation_lines(figures: &FxRevaluationFigures, accounts: &AccountMap) -> Vec<JournalLine> {
    let mut lines: Vec<JournalLine> = figures
        .revaluations
        .iter()
        .filter(|revaluation| !revaluation.difference.is_zero())
        .map(|revaluation| {
            let side = if revaluation.difference > Decimal::ZERO {
                revaluation.normal_side
            } else {
                revaluation.normal_side.opposite()
            };
            JournalLine::on_side(side, &revaluation.account_code, revaluation.difference.abs())
                .with_description(format!(
                    "{} {} at {}",
                    revaluation.foreign_amount, revaluation.currency, revaluation.rate
                ))
        })
        .collect();
    if figures.total_loss > Decimal::ZERO {
        lines.push(JournalLine::debit(&accounts.fx_loss, figures.total_loss));
    }
    if figures.total_gain > Decimal::ZERO {
        lines.push(JournalLine::credit(&accounts.fx_gain, figures.total_gain));
    }
    lines
}

/// Revalues open foreign-currency balances at the period-end rate.
pub struct FxRevaluationEngine;

impl FxRevaluationEngine {
    async fn rate_for(
        input: &StepInput<'_>,
        cache: &mut BTreeMap<String, ExchangeRate>,
        currency: &str,
        date: NaiveDate,
    ) -> Result<ExchangeRate, ClosureError> {
        if let Some(rate) = cache.get(currency) {
            return Ok(rate.clone());
        }
        let rate = input
            .sources
            .rates
            .closing_rate(currency, date)
            .await
            .map_err(|err| ClosureError::unavailable("exchange rate source", err))?
            .ok_or_else(|| ClosureError::NoExchangeRate {
                currency: currency.to_string(),
                date,
            })?;
        if !rate.is_valid() {
            return Err(ClosureError::Calculation(format!(
                "exchange rate for {currency} on {date} must be positive, got {}",
                rate.rate
            )));
        }
        cache.insert(currency.to_string(), rate.clone());
        Ok(rate)
    }
}

#[async_trait]
impl StepExecutor for FxRevaluationEngine {
    async fn execute(&self, input: &StepInput<'_>) -> Result<StepOutput, ClosureError> {
        let period = input.request.period;
        let date = period.end_date()?;
        let functional = &input.settings.functional_currency;
        let balances: Vec<ForeignCurrencyBalance> = input
            .sources
            .foreign_balances
            .open_balances(period.company_id, date)
            .await
            .map_err(|err| ClosureError::unavailable("foreign currency ledger", err))?
            .into_iter()
            .filter(|balance| !balance.currency.eq_ignore_ascii_case(functional))
            .collect();

        if balances.is_empty() {
            return Ok(StepOutput::new(StepFigures::FxRevaluation(FxRevaluationFigures {
                rate_date: Some(date),
                ..FxRevaluationFigures::default()
            }))
            .with_warning("no foreign-currency balances found"));
        }

        let mut rates = BTreeMap::new();
        let mut revaluations = Vec::with_capacity(balances.len());
        for balance in &balances {
            let rate = Self::rate_for(input, &mut rates, &balance.currency, date).await?;
            revaluations.push(revalue(balance, &rate));
        }

        let figures = summarize_revaluations(revaluations, date);
        let lines = revaluation_lines(&figures, &input.settings.accounts);
        if lines.is_empty() {
            return Ok(StepOutput::new(StepFigures::FxRevaluation(figures))
                .with_warning("foreign-currency balances already carried at closing rates"));
        }

        let posting = input.posting(
            StepId::FxRevaluation,
            format!("FX revaluation {period} at closing rates of {date}"),
            lines,
        )?;
        Ok(StepOutput::new(StepFigures::FxRevaluation(figures)).with_posting(posting))
    }
}
