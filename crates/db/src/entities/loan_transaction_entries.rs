//! `SeaORM` Entity for loan_transaction_entries table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::LoanEntryType;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "loan_transaction_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub loan_transaction_id: Uuid,
    pub account_id: Uuid,
    pub entry_type: LoanEntryType,
    pub name: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub debit: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub credit: Decimal,
    pub is_add_on: bool,
    pub is_automatic_deduction_deleted: bool,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::loan_transactions::Entity",
        from = "Column::LoanTransactionId",
        to = "super::loan_transactions::Column::Id",
        on_delete = "Cascade"
    )]
    LoanTransactions,
}

impl Related<super::loan_transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LoanTransactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
