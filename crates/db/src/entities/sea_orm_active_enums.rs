//! `SeaORM` active enums mapped to Postgres enum types.

use coopbooks_core::ledger;
use coopbooks_core::loan;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "entry_source")]
pub enum EntrySource {
    #[sea_orm(string_value = "payment")]
    Payment,
    #[sea_orm(string_value = "withdraw")]
    Withdraw,
    #[sea_orm(string_value = "deposit")]
    Deposit,
    #[sea_orm(string_value = "journal_voucher")]
    JournalVoucher,
    #[sea_orm(string_value = "check_voucher")]
    CheckVoucher,
    #[sea_orm(string_value = "adjustment")]
    Adjustment,
    #[sea_orm(string_value = "loan")]
    Loan,
    #[sea_orm(string_value = "disbursement")]
    Disbursement,
    #[sea_orm(string_value = "transfer")]
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "loan_entry_type")]
pub enum LoanEntryType {
    #[sea_orm(string_value = "deduction")]
    Deduction,
    #[sea_orm(string_value = "automatic_deduction")]
    AutomaticDeduction,
    #[sea_orm(string_value = "other")]
    Other,
}

impl From<ledger::EntrySource> for EntrySource {
    fn from(source: ledger::EntrySource) -> Self {
        match source {
            ledger::EntrySource::Payment => Self::Payment,
            ledger::EntrySource::Withdraw => Self::Withdraw,
            ledger::EntrySource::Deposit => Self::Deposit,
            ledger::EntrySource::JournalVoucher => Self::JournalVoucher,
            ledger::EntrySource::CheckVoucher => Self::CheckVoucher,
            ledger::EntrySource::Adjustment => Self::Adjustment,
            ledger::EntrySource::Loan => Self::Loan,
            ledger::EntrySource::Disbursement => Self::Disbursement,
            ledger::EntrySource::Transfer => Self::Transfer,
        }
    }
}

impl From<EntrySource> for ledger::EntrySource {
    fn from(source: EntrySource) -> Self {
        match source {
            EntrySource::Payment => Self::Payment,
            EntrySource::Withdraw => Self::Withdraw,
            EntrySource::Deposit => Self::Deposit,
            EntrySource::JournalVoucher => Self::JournalVoucher,
            EntrySource::CheckVoucher => Self::CheckVoucher,
            EntrySource::Adjustment => Self::Adjustment,
            EntrySource::Loan => Self::Loan,
            EntrySource::Disbursement => Self::Disbursement,
            EntrySource::Transfer => Self::Transfer,
        }
    }
}

impl From<loan::LoanEntryType> for LoanEntryType {
    fn from(entry_type: loan::LoanEntryType) -> Self {
        match entry_type {
            loan::LoanEntryType::Deduction => Self::Deduction,
            loan::LoanEntryType::AutomaticDeduction => Self::AutomaticDeduction,
            loan::LoanEntryType::Other => Self::Other,
        }
    }
}

impl From<LoanEntryType> for loan::LoanEntryType {
    fn from(entry_type: LoanEntryType) -> Self {
        match entry_type {
            LoanEntryType::Deduction => Self::Deduction,
            LoanEntryType::AutomaticDeduction => Self::AutomaticDeduction,
            LoanEntryType::Other => Self::Other,
        }
    }
}
