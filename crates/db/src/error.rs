//! Failure plumbing between storage calls and engine errors.

use coopbooks_core::batch::BatchError;
use coopbooks_core::ledger::LedgerError;
use coopbooks_core::loan::LoanError;
use coopbooks_core::{DomainError, EngineError, Operation};
use sea_orm::{DbErr, SqlErr};

/// Anything that can go wrong inside an engine operation.
///
/// `?` lifts both domain errors and `DbErr` into this type. The public entry
/// point turns it into an [`EngineError`] tagged with its operation.
#[derive(Debug)]
pub(crate) enum Failure {
    Domain(DomainError),
    Engine(EngineError),
    Storage(DbErr),
}

impl Failure {
    pub(crate) fn into_engine(self, operation: Operation) -> EngineError {
        match self {
            Self::Domain(err) => EngineError::new(operation, err),
            Self::Engine(err) => err,
            Self::Storage(err) => {
                tracing::warn!(%operation, error = %err, "Storage failure, rolling back");
                EngineError::new(operation, storage_error(operation, err.to_string()))
            }
        }
    }
}

/// Picks the domain whose `Database` variant reports a storage failure.
fn storage_error(operation: Operation, message: String) -> DomainError {
    match operation {
        Operation::Post
        | Operation::PostMany
        | Operation::Transfer
        | Operation::Reverse
        | Operation::AssignPrintNumber
        | Operation::ReadBalance
        | Operation::OpenTransaction => LedgerError::Database(message).into(),
        Operation::OpenBatch
        | Operation::EndBatch
        | Operation::SetDeposit
        | Operation::CashCount
        | Operation::Disbursement
        | Operation::Recompute => BatchError::Database(message).into(),
        Operation::CreateLoan | Operation::LoanEntry | Operation::Balance => {
            LoanError::Database(message).into()
        }
    }
}

impl From<DbErr> for Failure {
    fn from(err: DbErr) -> Self {
        Self::Storage(err)
    }
}

impl From<EngineError> for Failure {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl From<LedgerError> for Failure {
    fn from(err: LedgerError) -> Self {
        Self::Domain(err.into())
    }
}

impl From<BatchError> for Failure {
    fn from(err: BatchError) -> Self {
        Self::Domain(err.into())
    }
}

impl From<LoanError> for Failure {
    fn from(err: LoanError) -> Self {
        Self::Domain(err.into())
    }
}

/// Returns true if `err` is a unique index violation.
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
