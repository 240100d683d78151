//! Loan transaction lines and their balancing.

pub mod error;
pub mod service;
pub mod types;

#[cfg(test)]
mod service_props;

pub use error::LoanError;
pub use service::{CASH_LINE_NAME, LoanService, RECEIVABLE_LINE_NAME};
pub use types::{
    BalancedLoan, DeductionInput, LineUpdate, LoanEntryType, LoanSetupInput, LoanTotals,
    LoanTransaction, LoanTransactionEntry, NewLoanEntry,
};
