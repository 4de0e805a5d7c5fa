//! `SeaORM` Entity for fiscal_period_locks table.
//!
//! A row exists only for a locked period. `month` is 0 for a fiscal year.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "fiscal_period_locks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub company_id: Uuid,
    pub year: i32,
    pub month: i16,
    pub locked_at: DateTimeWithTimeZone,
    pub locked_by_run: Uuid,
    pub locked_by: Option<Uuid>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
