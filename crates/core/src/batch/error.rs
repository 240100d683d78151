//! Batch reconciliation error types.

use rust_decimal::Decimal;
use thiserror::Error;
use coopbooks_shared::types::{
    CashCountId, DisbursementTransactionId, TransactionBatchId, UserId,
};

use crate::error::ErrorKind;

/// Errors that can occur during batch operations.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Batch not found.
    #[error("Transaction batch not found: {0}")]
    BatchNotFound(TransactionBatchId),

    /// The actor has no open batch in this organization and branch.
    #[error("No active transaction batch for user {user_id}")]
    NoActiveBatch {
        /// The acting user.
        user_id: UserId,
    },

    /// The actor already has an open batch in this organization and branch.
    #[error("Transaction batch {0} is still open; end it before starting another")]
    BatchAlreadyOpen(TransactionBatchId),

    /// The batch has been ended.
    #[error("Transaction batch {0} is closed")]
    BatchClosed(TransactionBatchId),

    /// Cash count line not found in the batch.
    #[error("Cash count not found: {0}")]
    CashCountNotFound(CashCountId),

    /// Disbursement line not found in the batch.
    #[error("Disbursement transaction not found: {0}")]
    DisbursementNotFound(DisbursementTransactionId),

    /// Denomination must be positive.
    #[error("Bill amount must be positive, got {0}")]
    InvalidBillAmount(Decimal),

    /// Quantity cannot be negative.
    #[error("Quantity cannot be negative, got {0}")]
    NegativeQuantity(i32),

    /// Disbursement amount must be positive.
    #[error("Disbursement amount must be positive, got {0}")]
    InvalidDisbursementAmount(Decimal),

    /// Deposit-in-bank cannot be negative.
    #[error("Deposit in bank cannot be negative, got {0}")]
    NegativeDeposit(Decimal),

    /// Amount has more decimal places than the batch currency allows.
    #[error("Amount {amount} exceeds {currency} precision")]
    ExcessPrecision {
        /// The offending amount.
        amount: Decimal,
        /// Currency code of the batch.
        currency: &'static str,
    },

    /// Amount or computed total does not fit the amount column.
    #[error("Amount {0} is out of range")]
    AmountOutOfRange(Decimal),

    /// The batch belongs to another organization or branch.
    #[error("{entity} {id} does not belong to the acting organization and branch")]
    CrossTenantReference {
        /// Kind of record referenced.
        entity: &'static str,
        /// Its identifier.
        id: String,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl BatchError {
    /// Returns the error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BatchNotFound(_) | Self::CashCountNotFound(_) | Self::DisbursementNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::NoActiveBatch { .. } | Self::BatchAlreadyOpen(_) | Self::BatchClosed(_) => {
                ErrorKind::Conflict
            }
            Self::InvalidBillAmount(_)
            | Self::NegativeQuantity(_)
            | Self::InvalidDisbursementAmount(_)
            | Self::NegativeDeposit(_)
            | Self::ExcessPrecision { .. }
            | Self::AmountOutOfRange(_)
            | Self::CrossTenantReference { .. } => ErrorKind::Validation,
            Self::Database(_) => ErrorKind::Transient,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BatchNotFound(_) => "BATCH_NOT_FOUND",
            Self::NoActiveBatch { .. } => "NO_ACTIVE_BATCH",
            Self::BatchAlreadyOpen(_) => "BATCH_ALREADY_OPEN",
            Self::BatchClosed(_) => "BATCH_CLOSED",
            Self::CashCountNotFound(_) => "CASH_COUNT_NOT_FOUND",
            Self::DisbursementNotFound(_) => "DISBURSEMENT_NOT_FOUND",
            Self::InvalidBillAmount(_) => "INVALID_BILL_AMOUNT",
            Self::NegativeQuantity(_) => "NEGATIVE_QUANTITY",
            Self::InvalidDisbursementAmount(_) => "INVALID_DISBURSEMENT_AMOUNT",
            Self::NegativeDeposit(_) => "NEGATIVE_DEPOSIT",
            Self::ExcessPrecision { .. } => "EXCESS_PRECISION",
            Self::AmountOutOfRange(_) => "AMOUNT_OUT_OF_RANGE",
            Self::CrossTenantReference { .. } => "CROSS_TENANT_REFERENCE",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    ///
    /// `NoActiveBatch` is a conflict kind but surfaces as 400.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::BatchNotFound(_) | Self::CashCountNotFound(_) | Self::DisbursementNotFound(_) => {
                404
            }
            Self::BatchAlreadyOpen(_) => 409,
            Self::BatchClosed(_) => 422,
            Self::NoActiveBatch { .. }
            | Self::InvalidBillAmount(_)
            | Self::NegativeQuantity(_)
            | Self::InvalidDisbursementAmount(_)
            | Self::NegativeDeposit(_)
            | Self::ExcessPrecision { .. }
            | Self::AmountOutOfRange(_)
            | Self::CrossTenantReference { .. } => 400,
            Self::Database(_) => 503,
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_active_batch_is_a_client_error() {
        let err = BatchError::NoActiveBatch {
            user_id: UserId::new(),
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.http_status_code(), 400);
        assert_eq!(err.error_code(), "NO_ACTIVE_BATCH");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(
            BatchError::BatchNotFound(TransactionBatchId::new()).http_status_code(),
            404
        );
        assert_eq!(
            BatchError::BatchAlreadyOpen(TransactionBatchId::new()).http_status_code(),
            409
        );
        assert_eq!(BatchError::NegativeQuantity(-1).http_status_code(), 400);
        assert_eq!(
            BatchError::CrossTenantReference {
                entity: "transaction batch",
                id: TransactionBatchId::new().to_string(),
            }
            .http_status_code(),
            400
        );
        assert_eq!(BatchError::Database("x".into()).http_status_code(), 503);
    }
}
