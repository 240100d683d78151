//! `SeaORM` Entity for transaction_batches table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "transaction_batches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub branch_id: Uuid,
    pub employee_user_id: Uuid,
    pub currency: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub deposit_in_bank: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub cash_count_total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub grand_total: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_disbursement: Decimal,
    pub is_closed: bool,
    pub started_at: DateTimeWithTimeZone,
    pub ended_at: Option<DateTimeWithTimeZone>,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cash_counts::Entity")]
    CashCounts,
    #[sea_orm(has_many = "super::disbursement_transactions::Entity")]
    DisbursementTransactions,
    #[sea_orm(has_many = "super::transactions::Entity")]
    Transactions,
}

impl Related<super::cash_counts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CashCounts.def()
    }
}

impl Related<super::disbursement_transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DisbursementTransactions.def()
    }
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
