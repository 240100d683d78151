//! Error taxonomy for engine operations.
//!
//! Every domain error belongs to one [`ErrorKind`]. Engine entry points wrap
//! the domain error in an [`EngineError`] that records which operation failed
//! and otherwise passes the error through untouched.

use coopbooks_shared::AppError;
use serde::Serialize;
use thiserror::Error;

use crate::batch::BatchError;
use crate::ledger::LedgerError;
use crate::loan::LoanError;

/// Classification of engine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input. Never retried.
    Validation,
    /// Unknown entry, batch, loan, or account.
    NotFound,
    /// A domain rule refused the request (balance policy, no active batch).
    Conflict,
    /// Transaction start/commit or other storage failure. Caller may retry.
    Transient,
}

/// The engine operation an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Single ledger posting.
    Post,
    /// All-or-nothing set of postings.
    PostMany,
    /// Matched debit/credit transfer pair.
    Transfer,
    /// Reversal of a prior entry.
    Reverse,
    /// Print number back-fill.
    AssignPrintNumber,
    /// Balance or transaction summary read.
    ReadBalance,
    /// Teller transaction header creation.
    OpenTransaction,
    /// Opening a teller batch.
    OpenBatch,
    /// Ending a teller batch.
    EndBatch,
    /// Changing a batch's deposit-in-bank.
    SetDeposit,
    /// Creating, editing, or deleting cash count lines.
    CashCount,
    /// Creating, editing, or deleting disbursement lines.
    Disbursement,
    /// Batch totals recomputation.
    Recompute,
    /// Loan setup.
    CreateLoan,
    /// Adding, editing, deleting, or restoring a loan entry.
    LoanEntry,
    /// Loan totals recomputation.
    Balance,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Post => "post",
            Self::PostMany => "post_many",
            Self::Transfer => "transfer",
            Self::Reverse => "reverse",
            Self::AssignPrintNumber => "assign_print_number",
            Self::ReadBalance => "read_balance",
            Self::OpenTransaction => "open_transaction",
            Self::OpenBatch => "open_batch",
            Self::EndBatch => "end_batch",
            Self::SetDeposit => "set_deposit",
            Self::CashCount => "cash_count",
            Self::Disbursement => "disbursement",
            Self::Recompute => "recompute",
            Self::CreateLoan => "create_loan",
            Self::LoanEntry => "loan_entry",
            Self::Balance => "balance",
        };
        f.write_str(name)
    }
}

/// Any domain error the engine can raise.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Ledger posting failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Batch reconciliation failure.
    #[error(transparent)]
    Batch(#[from] BatchError),
    /// Loan balancing failure.
    #[error(transparent)]
    Loan(#[from] LoanError),
}

impl DomainError {
    /// Returns the error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Ledger(e) => e.kind(),
            Self::Batch(e) => e.kind(),
            Self::Loan(e) => e.kind(),
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Ledger(e) => e.error_code(),
            Self::Batch(e) => e.error_code(),
            Self::Loan(e) => e.error_code(),
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::Ledger(e) => e.http_status_code(),
            Self::Batch(e) => e.http_status_code(),
            Self::Loan(e) => e.http_status_code(),
        }
    }
}

/// A domain error tagged with the operation that raised it.
#[derive(Debug, Error)]
#[error("{operation} failed: {source}")]
pub struct EngineError {
    /// The failing operation.
    pub operation: Operation,
    /// The underlying domain error.
    #[source]
    pub source: DomainError,
}

impl EngineError {
    /// Wraps a domain error.
    pub fn new(operation: Operation, source: impl Into<DomainError>) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        self.source.error_code()
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        self.source.http_status_code()
    }

    /// Returns true if the caller may retry the whole request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Returns the ledger error, if this is one.
    #[must_use]
    pub fn as_ledger(&self) -> Option<&LedgerError> {
        match &self.source {
            DomainError::Ledger(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the batch error, if this is one.
    #[must_use]
    pub fn as_batch(&self) -> Option<&BatchError> {
        match &self.source {
            DomainError::Batch(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the loan error, if this is one.
    #[must_use]
    pub fn as_loan(&self) -> Option<&LoanError> {
        match &self.source {
            DomainError::Loan(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::Validation => Self::Validation(message),
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::Conflict => match err.http_status_code() {
                409 => Self::Conflict(message),
                _ => Self::BusinessRule(message),
            },
            ErrorKind::Transient => Self::Database(message),
        }
    }
}
