//! Allocation of the year's net profit.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::{StepExecutor, StepFigures, StepInput, StepOutput};
use crate::closure::error::ClosureError;
use crate::closure::options::DistributionRequest;
use crate::closure::settings::AccountMap;
use crate::closure::types::{ProfitDistribution, StepId};
use crate::ledger::JournalLine;

/// Validates the requested allocations and derives retained earnings.
///
/// The four allocations may not exceed `net_profit`. In a loss year
/// nothing can be allocated and the whole loss is retained.
pub fn distribute(
    net_profit: Decimal,
    request: &DistributionRequest,
) -> Result<ProfitDistribution, ClosureError> {
    request.validate()?;
    let requested = request.total();
    let loss_carried = net_profit < Decimal::ZERO && requested.is_zero();
    if requested > net_profit && !loss_carried {
        return Err(ClosureError::DistributionExceedsProfit {
            requested,
            net_profit,
        });
    }
    Ok(ProfitDistribution {
        legal_reserve: request.legal_reserve,
        statutory_reserves: request.statutory_reserves,
        other_reserves: request.other_reserves,
        dividends: request.dividends,
        retained_earnings: net_profit - requested,
    })
}

fn distribution_lines(
    net_profit: Decimal,
    distribution: &ProfitDistribution,
    accounts: &AccountMap,
) -> Vec<JournalLine> {
    if net_profit < Decimal::ZERO {
        return vec![
            JournalLine::debit(&accounts.retained_earnings, -net_profit),
            JournalLine::credit(&accounts.profit_and_loss, -net_profit),
        ];
    }
    let allocations = [
        (&accounts.legal_reserve, distribution.legal_reserve),
        (&accounts.statutory_reserves, distribution.statutory_reserves),
        (&accounts.other_reserves, distribution.other_reserves),
        (&accounts.dividends_payable, distribution.dividends),
        (&accounts.retained_earnings, distribution.retained_earnings),
    ];
    std::iter::once(JournalLine::debit(&accounts.profit_and_loss, net_profit))
        .chain(
            allocations
                .into_iter()
                .filter(|(_, amount)| *amount > Decimal::ZERO)
                .map(|(account, amount)| JournalLine::credit(account, amount)),
        )
        .collect()
}

/// Allocates net profit to reserves, dividends and retained earnings.
pub struct ProfitDistributionEngine;

#[async_trait]
impl StepExecutor for ProfitDistributionEngine {
    async fn execute(&self, input: &StepInput<'_>) -> Result<StepOutput, ClosureError> {
        let net_profit = input.context.net_profit();
        let request = input.request.options.annual().profit_distribution;
        let distribution = distribute(net_profit, &request)?;

        let output = StepOutput::new(StepFigures::ProfitDistribution(distribution));
        if net_profit.is_zero() {
            return Ok(output.with_warning("net profit is zero; nothing to distribute"));
        }
        let output = if net_profit < Decimal::ZERO {
            output.with_warning(format!(
                "loss of {} carried forward to retained earnings",
                -net_profit
            ))
        } else {
            output
        };
        let posting = input.posting(
            StepId::ProfitDistribution,
            format!("Profit distribution {}", input.request.period),
            distribution_lines(net_profit, &distribution, &input.settings.accounts),
        )?;
        Ok(output.with_posting(posting))
    }
}
