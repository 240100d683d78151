//! Ledger posting logic.
//!
//! This module implements the pure half of the ledger:
//! - Posting request and entry types
//! - Balance aggregation (credit-positive)
//! - Amount, scope, and balance policy validation
//! - Reversal derivation

pub mod balance;
pub mod entry;
pub mod error;
pub mod service;
pub mod types;

#[cfg(test)]
mod service_props;

pub use balance::{BalanceSummary, DebitCredit, aggregate, reversal_of, signed_change, sum_amounts};
pub use entry::{LedgerEntry, REVERSAL_PREFIX};
pub use error::LedgerError;
pub use service::LedgerService;
pub use types::{
    AccountInfo, Actor, BalancePolicy, EntrySide, EntrySource, PostingRequest, TransferRequest,
};
