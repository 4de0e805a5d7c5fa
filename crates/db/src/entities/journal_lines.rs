//! `SeaORM` Entity for journal_lines table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "journal_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub posting_id: Uuid,
    pub line_no: i32,
    pub account_code: String,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))")]
    pub debit: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))")]
    pub credit: Decimal,
    pub description: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::journal_postings::Entity",
        from = "Column::PostingId",
        to = "super::journal_postings::Column::Id"
    )]
    JournalPostings,
}

impl Related<super::journal_postings::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::JournalPostings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
