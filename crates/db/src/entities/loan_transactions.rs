//! `SeaORM` Entity for loan_transactions table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "loan_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub branch_id: Uuid,
    pub member_profile_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub applied_amount: Decimal,
    pub receivable_account_id: Uuid,
    pub cash_account_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub principal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_deductions: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_automatic_deductions: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_manual_deductions: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_add_on: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub net_proceeds: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_debit: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_credit: Decimal,
    pub created_by: Uuid,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::loan_transaction_entries::Entity")]
    LoanTransactionEntries,
    #[sea_orm(
        belongs_to = "super::member_profiles::Entity",
        from = "Column::MemberProfileId",
        to = "super::member_profiles::Column::Id"
    )]
    MemberProfiles,
}

impl Related<super::loan_transaction_entries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LoanTransactionEntries.def()
    }
}

impl Related<super::member_profiles::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MemberProfiles.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
