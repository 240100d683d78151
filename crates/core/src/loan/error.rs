//! Loan balancing error types.

use rust_decimal::Decimal;
use thiserror::Error;
use coopbooks_shared::types::{AccountId, LoanTransactionEntryId, LoanTransactionId};

use crate::error::ErrorKind;

/// Errors that can occur during loan entry operations.
#[derive(Debug, Error)]
pub enum LoanError {
    // ========== Not Found Errors ==========
    /// Loan transaction not found.
    #[error("Loan transaction not found: {0}")]
    LoanNotFound(LoanTransactionId),

    /// Loan entry not found on the loan.
    #[error("Loan transaction entry not found: {0}")]
    EntryNotFound(LoanTransactionEntryId),

    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    // ========== State Machine Errors ==========
    /// Only automatic deductions can be soft-deleted or restored.
    #[error("Entry {0} is not an automatic deduction")]
    NotAutomaticDeduction(LoanTransactionEntryId),

    /// Restore requested for an entry that is not soft-deleted.
    #[error("Entry {0} is not deleted")]
    NotDeleted(LoanTransactionEntryId),

    /// Soft delete requested for an entry already soft-deleted.
    #[error("Entry {0} is already deleted")]
    AlreadyDeleted(LoanTransactionEntryId),

    /// Automatic deductions are soft-deleted, never hard-deleted.
    #[error("Automatic deduction {0} must be soft-deleted")]
    AutomaticDeductionRequiresSoftDelete(LoanTransactionEntryId),

    /// Receivable and cash lines are maintained by the balancer.
    #[error("Entry {0} is generated by the loan balancer and cannot be changed directly")]
    GeneratedLine(LoanTransactionEntryId),

    /// Only deductions can be edited.
    #[error("Entry {0} is not a deduction")]
    NotADeduction(LoanTransactionEntryId),

    // ========== Validation Errors ==========
    /// Amount must be positive.
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    /// Amount has more decimal places than the loan currency allows.
    #[error("Amount {amount} exceeds {currency} precision")]
    ExcessPrecision {
        /// The offending amount.
        amount: Decimal,
        /// Currency code of the loan's receivable account.
        currency: &'static str,
    },

    /// Amount or computed total does not fit the amount column.
    #[error("Amount {0} is out of range")]
    AmountOutOfRange(Decimal),

    /// Deduction name is required.
    #[error("Deduction name cannot be empty")]
    EmptyName,

    /// Receivable and cash accounts must differ.
    #[error("Receivable and cash accounts must be different")]
    SameReceivableAndCashAccount,

    /// Deductions leave nothing to release.
    #[error("Deductions ({deductions}) exceed loan principal ({principal})")]
    DeductionsExceedPrincipal {
        /// Net deductions.
        deductions: Decimal,
        /// Loan principal.
        principal: Decimal,
    },

    /// A referenced record belongs to another organization or branch.
    #[error("{entity} {id} does not belong to the acting organization and branch")]
    CrossTenantReference {
        /// Kind of record referenced.
        entity: &'static str,
        /// Its identifier.
        id: String,
    },

    /// The loan lacks its receivable or cash line.
    #[error("Loan is missing its {0} line")]
    MissingGeneratedLine(&'static str),

    // ========== Database Errors ==========
    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl LoanError {
    /// Returns the error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LoanNotFound(_) | Self::EntryNotFound(_) | Self::AccountNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::MissingGeneratedLine(_) => ErrorKind::Conflict,
            Self::Database(_) => ErrorKind::Transient,
            _ => ErrorKind::Validation,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::LoanNotFound(_) => "LOAN_NOT_FOUND",
            Self::EntryNotFound(_) => "LOAN_ENTRY_NOT_FOUND",
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::NotAutomaticDeduction(_) => "NOT_AUTOMATIC_DEDUCTION",
            Self::NotDeleted(_) => "NOT_DELETED",
            Self::AlreadyDeleted(_) => "ALREADY_DELETED",
            Self::AutomaticDeductionRequiresSoftDelete(_) => "AUTOMATIC_DEDUCTION_REQUIRES_SOFT_DELETE",
            Self::GeneratedLine(_) => "GENERATED_LINE",
            Self::NotADeduction(_) => "NOT_A_DEDUCTION",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::ExcessPrecision { .. } => "EXCESS_PRECISION",
            Self::AmountOutOfRange(_) => "AMOUNT_OUT_OF_RANGE",
            Self::EmptyName => "EMPTY_NAME",
            Self::SameReceivableAndCashAccount => "SAME_RECEIVABLE_AND_CASH_ACCOUNT",
            Self::DeductionsExceedPrincipal { .. } => "DEDUCTIONS_EXCEED_PRINCIPAL",
            Self::CrossTenantReference { .. } => "CROSS_TENANT_REFERENCE",
            Self::MissingGeneratedLine(_) => "MISSING_GENERATED_LINE",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 422,
            ErrorKind::Transient => 503,
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
