//! `SeaORM` entity definitions.
//!
//! Shaped like `sea-orm-cli generate entity` output against the migrated schema.

#![allow(missing_docs)]

pub mod prelude;

pub mod accounts;
pub mod cash_counts;
pub mod disbursement_transactions;
pub mod ledger_entries;
pub mod loan_transaction_entries;
pub mod loan_transactions;
pub mod member_joint_accounts;
pub mod member_profiles;
pub mod sea_orm_active_enums;
pub mod transaction_batches;
pub mod transactions;
