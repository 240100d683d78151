//! The posting engine's transactional services.
//!
//! Each service is generic over the caller's connection: pass a pool
//! connection to run an operation in its own transaction, or a
//! `DatabaseTransaction` to nest it under a savepoint.

pub mod batch;
pub mod ledger;
pub mod loan;
pub mod transaction;

pub use batch::{BatchReconciler, BatchUpdate};
pub use ledger::LedgerPoster;
pub use loan::LoanBalancer;
pub use transaction::{OpenTransactionInput, TellerTransaction, TransactionRepository};
