//! Teller transaction batches and their reconciliation.

pub mod error;
pub mod service;
pub mod types;


pub use error::BatchError;
pub use service::BatchService;
pub use types::{
    BatchTotals, CashCountInput, CashCountLine, DisbursementInput, DisbursementLine,
    OpenBatchInput, TransactionBatch,
};
