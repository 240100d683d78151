//! Core ledger posting and reconciliation logic for Coopbooks.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! All domain types, validation rules, and aggregate calculations live here; the
//! `coopbooks-db` crate wraps them in scoped database transactions.
//!
//! # Modules
//!
//! - `ledger` - Ledger entries, the balance aggregator, posting and reversal rules
//! - `batch` - Teller transaction batches, cash counts, and disbursements
//! - `loan` - Loan transaction entries and the loan balancer
//! - `error` - Error taxonomy shared by all engine operations

pub mod batch;
pub mod error;
pub mod ledger;
pub mod loan;

pub use error::{DomainError, EngineError, ErrorKind, Operation};
