//! `SeaORM` Entity for member_profiles table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "member_profiles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub branch_id: Uuid,
    pub full_name: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::member_joint_accounts::Entity")]
    MemberJointAccounts,
    #[sea_orm(has_many = "super::loan_transactions::Entity")]
    LoanTransactions,
}

impl Related<super::member_joint_accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MemberJointAccounts.def()
    }
}

impl Related<super::loan_transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LoanTransactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
