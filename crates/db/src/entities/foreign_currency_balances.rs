//! `SeaORM` Entity for foreign_currency_balances table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "foreign_currency_balances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub company_id: Uuid,
    pub account_code: String,
    pub currency: String,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))")]
    pub foreign_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))")]
    pub carrying_amount: Decimal,
    /// `debit` or `credit`.
    pub normal_side: String,
    pub as_of: Date,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
