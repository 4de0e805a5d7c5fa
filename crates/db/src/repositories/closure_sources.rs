//! Registers read by the closure steps: depreciation schedule, foreign
//! balances, closing rates and VAT settings.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use closure_core::closure::{
    DepreciationLine, ExchangeRateSource, FixedAssetRegister, ForeignCurrencyBalance,
    ForeignCurrencyLedger, SourceError, VatCadence, VatSettings, VatSettingsProvider,
};
use closure_core::currency::ExchangeRate;
use closure_core::ledger::EntryType;
use closure_shared::types::{AssetId, CompanyId};
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder};

use crate::entities::{depreciation_schedule, exchange_rates, foreign_currency_balances, vat_settings};

fn source_error(err: DbErr) -> SourceError {
    SourceError(err.to_string())
}

/// Parses a stored normal side.
pub fn parse_side(value: &str) -> Option<EntryType> {
    match value {
        "debit" => Some(EntryType::Debit),
        "credit" => Some(EntryType::Credit),
        _ => None,
    }
}

/// Parses a stored VAT cadence.
pub fn parse_cadence(value: &str) -> Option<VatCadence> {
    match value {
        "monthly" => Some(VatCadence::Monthly),
        "quarterly" => Some(VatCadence::Quarterly),
        _ => None,
    }
}

/// Keeps the newest snapshot of each (account, currency). Input must be
/// ordered newest first.
pub fn latest_snapshots(
    rows: Vec<foreign_currency_balances::Model>,
) -> Result<Vec<ForeignCurrencyBalance>, SourceError> {
    let mut seen = HashSet::new();
    let mut balances = Vec::new();
    for row in rows {
        if !seen.insert((row.account_code.clone(), row.currency.clone())) {
            continue;
        }
        let normal_side = parse_side(&row.normal_side).ok_or_else(|| {
            SourceError(format!(
                "balance of {} has unknown normal side '{}'",
                row.account_code, row.normal_side
            ))
        })?;
        balances.push(ForeignCurrencyBalance {
            account_code: row.account_code,
            currency: row.currency,
            foreign_amount: row.foreign_amount,
            carrying_amount: row.carrying_amount,
            normal_side,
        });
    }
    Ok(balances)
}

/// Closure registers stored in Postgres.
#[derive(Debug, Clone)]
pub struct ClosureSourceRepository {
    db: DatabaseConnection,
}

impl ClosureSourceRepository {
    /// Creates a new source repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FixedAssetRegister for ClosureSourceRepository {
    async fn scheduled_depreciation(
        &self,
        company_id: CompanyId,
        year: i32,
        month: u32,
    ) -> Result<Vec<DepreciationLine>, SourceError> {
        let month = i16::try_from(month).map_err(|_| SourceError(format!("invalid month {month}")))?;
        let rows = depreciation_schedule::Entity::find()
            .filter(depreciation_schedule::Column::CompanyId.eq(company_id.into_inner()))
            .filter(depreciation_schedule::Column::Year.eq(year))
            .filter(depreciation_schedule::Column::Month.eq(month))
            .order_by_asc(depreciation_schedule::Column::AssetClass)
            .all(&self.db)
            .await
            .map_err(source_error)?;
        Ok(rows
            .into_iter()
            .map(|row| DepreciationLine {
                asset_id: AssetId::from_uuid(row.asset_id),
                asset_name: row.asset_name,
                asset_class: row.asset_class,
                expense_account: row.expense_account,
                amount: row.amount,
                is_active: row.is_active,
            })
            .collect())
    }
}

#[async_trait]
impl ForeignCurrencyLedger for ClosureSourceRepository {
    async fn open_balances(
        &self,
        company_id: CompanyId,
        as_of: NaiveDate,
    ) -> Result<Vec<ForeignCurrencyBalance>, SourceError> {
        let rows = foreign_currency_balances::Entity::find()
            .filter(foreign_currency_balances::Column::CompanyId.eq(company_id.into_inner()))
            .filter(foreign_currency_balances::Column::AsOf.lte(as_of))
            .order_by_desc(foreign_currency_balances::Column::AsOf)
            .all(&self.db)
            .await
            .map_err(source_error)?;
        latest_snapshots(rows)
    }
}

#[async_trait]
impl ExchangeRateSource for ClosureSourceRepository {
    async fn closing_rate(
        &self,
        currency: &str,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>, SourceError> {
        let currency = currency.to_uppercase();
        let rate = exchange_rates::Entity::find()
            .filter(exchange_rates::Column::Currency.eq(currency.as_str()))
            .filter(exchange_rates::Column::EffectiveDate.lte(date))
            .order_by_desc(exchange_rates::Column::EffectiveDate)
            .one(&self.db)
            .await
            .map_err(source_error)?;
        Ok(rate.map(|row| ExchangeRate::new(row.currency, row.rate, row.effective_date)))
    }
}

#[async_trait]
impl VatSettingsProvider for ClosureSourceRepository {
    async fn settings(&self, company_id: CompanyId) -> Result<VatSettings, SourceError> {
        let Some(row) = vat_settings::Entity::find_by_id(company_id.into_inner())
            .one(&self.db)
            .await
            .map_err(source_error)?
        else {
            return Ok(VatSettings::default());
        };
        let cadence = parse_cadence(&row.cadence).ok_or_else(|| {
            SourceError(format!("unknown VAT cadence '{}'", row.cadence))
        })?;
        Ok(VatSettings {
            is_vat_payer: row.is_vat_payer,
            cadence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn snapshot(account: &str, carrying: rust_decimal::Decimal, day: u32) -> foreign_currency_balances::Model {
        foreign_currency_balances::Model {
            id: Uuid::new_v4(),
            company_id: Uuid::nil(),
            account_code: account.to_string(),
            currency: "EUR".to_string(),
            foreign_amount: dec!(100),
            carrying_amount: carrying,
            normal_side: "debit".to_string(),
            as_of: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
        }
    }

    #[test]
    fn test_latest_snapshot_wins() {
        let rows = vec![
            snapshot("5124", dec!(497), 31),
            snapshot("5124", dec!(495), 1),
            snapshot("2678", dec!(500), 15),
        ];
        let balances = latest_snapshots(rows).unwrap();
        assert_eq!(balances.len(), 2);
        assert_eq!(balances[0].carrying_amount, dec!(497));
    }

    #[test]
    fn test_unknown_side_is_an_error() {
        let mut row = snapshot("5124", dec!(497), 31);
        row.normal_side = "left".to_string();
        assert!(latest_snapshots(vec![row]).is_err());
    }

    #[test]
    fn test_parse_cadence() {
        assert_eq!(parse_cadence("quarterly"), Some(VatCadence::Quarterly));
        assert_eq!(parse_cadence("yearly"), None);
    }
}
