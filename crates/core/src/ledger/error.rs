//! Ledger error types for posting, reversal, and balance policy.

use rust_decimal::Decimal;
use thiserror::Error;
use coopbooks_shared::types::{
    AccountId, LedgerEntryId, LoanTransactionId, MemberJointAccountId, MemberProfileId,
    TransactionId,
};

use crate::error::ErrorKind;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // ========== Validation Errors ==========
    /// Posting amount cannot be zero.
    #[error("Posting amount cannot be zero")]
    ZeroAmount,

    /// Posting amount cannot be negative.
    #[error("Posting amount cannot be negative")]
    NegativeAmount,

    /// Both or neither of debit/credit were set.
    #[error("Posting must specify either debit or credit, not both")]
    InvalidEntryType,

    /// Amount has more decimal places than the account currency allows.
    #[error("Amount {amount} exceeds {currency} precision")]
    ExcessPrecision {
        /// The offending amount.
        amount: Decimal,
        /// Currency code of the account.
        currency: &'static str,
    },

    /// Amount does not fit the ledger's amount column.
    #[error("Amount {0} is out of range")]
    AmountOutOfRange(Decimal),

    /// A multi-posting call carried no postings.
    #[error("At least one posting is required")]
    EmptyPosting,

    /// Transfer source and destination are the same account.
    #[error("Cannot transfer to the same account")]
    SameAccountTransfer,

    /// A referenced record belongs to another organization or branch.
    #[error("{entity} {id} does not belong to the acting organization and branch")]
    CrossTenantReference {
        /// Kind of record referenced.
        entity: &'static str,
        /// Its identifier.
        id: String,
    },

    /// The joint account holder is registered under a different member.
    #[error("Joint account {0} does not belong to the member")]
    JointAccountMemberMismatch(MemberJointAccountId),

    /// The entry is itself a reversal.
    #[error("Entry {0} is a reversal and cannot be reversed")]
    CannotReverseReversal(LedgerEntryId),

    // ========== Not Found Errors ==========
    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Ledger entry not found.
    #[error("Ledger entry not found: {0}")]
    EntryNotFound(LedgerEntryId),

    /// Member profile not found.
    #[error("Member profile not found: {0}")]
    MemberNotFound(MemberProfileId),

    /// Joint account not found.
    #[error("Joint account not found: {0}")]
    JointAccountNotFound(MemberJointAccountId),

    /// Teller transaction not found.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// Loan transaction not found.
    #[error("Loan transaction not found: {0}")]
    LoanTransactionNotFound(LoanTransactionId),

    // ========== Policy Errors ==========
    /// Withdrawal would leave a negative balance.
    #[error("Negative balance not allowed: balance after posting would be {balance_after}")]
    NegativeBalanceNotAllowed {
        /// Projected balance.
        balance_after: Decimal,
    },

    /// Withdrawal would leave exactly zero.
    #[error("Exact zero balance not allowed")]
    ExactBalanceNotAllowed,

    /// Withdrawal would drop below the maintaining balance.
    #[error(
        "Balance after posting ({balance_after}) would fall below maintaining balance {maintaining_balance}"
    )]
    BelowMaintainingBalance {
        /// Projected balance.
        balance_after: Decimal,
        /// Configured floor.
        maintaining_balance: Decimal,
    },

    /// The entry already has a reversal.
    #[error("Entry {0} has already been reversed")]
    AlreadyReversed(LedgerEntryId),

    // ========== Database Errors ==========
    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl LedgerError {
    /// Returns the error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ZeroAmount
            | Self::NegativeAmount
            | Self::InvalidEntryType
            | Self::ExcessPrecision { .. }
            | Self::AmountOutOfRange(_)
            | Self::EmptyPosting
            | Self::SameAccountTransfer
            | Self::CrossTenantReference { .. }
            | Self::JointAccountMemberMismatch(_)
            | Self::CannotReverseReversal(_) => ErrorKind::Validation,

            Self::AccountNotFound(_)
            | Self::EntryNotFound(_)
            | Self::MemberNotFound(_)
            | Self::JointAccountNotFound(_)
            | Self::TransactionNotFound(_)
            | Self::LoanTransactionNotFound(_) => ErrorKind::NotFound,

            Self::NegativeBalanceNotAllowed { .. }
            | Self::ExactBalanceNotAllowed
            | Self::BelowMaintainingBalance { .. }
            | Self::AlreadyReversed(_) => ErrorKind::Conflict,

            Self::Database(_) => ErrorKind::Transient,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ZeroAmount => "ZERO_AMOUNT",
            Self::NegativeAmount => "NEGATIVE_AMOUNT",
            Self::InvalidEntryType => "INVALID_ENTRY_TYPE",
            Self::ExcessPrecision { .. } => "EXCESS_PRECISION",
            Self::AmountOutOfRange(_) => "AMOUNT_OUT_OF_RANGE",
            Self::EmptyPosting => "EMPTY_POSTING",
            Self::SameAccountTransfer => "SAME_ACCOUNT_TRANSFER",
            Self::CrossTenantReference { .. } => "CROSS_TENANT_REFERENCE",
            Self::JointAccountMemberMismatch(_) => "JOINT_ACCOUNT_MEMBER_MISMATCH",
            Self::CannotReverseReversal(_) => "CANNOT_REVERSE_REVERSAL",
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::EntryNotFound(_) => "ENTRY_NOT_FOUND",
            Self::MemberNotFound(_) => "MEMBER_NOT_FOUND",
            Self::JointAccountNotFound(_) => "JOINT_ACCOUNT_NOT_FOUND",
            Self::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            Self::LoanTransactionNotFound(_) => "LOAN_TRANSACTION_NOT_FOUND",
            Self::NegativeBalanceNotAllowed { .. } => "NEGATIVE_BALANCE_NOT_ALLOWED",
            Self::ExactBalanceNotAllowed => "EXACT_BALANCE_NOT_ALLOWED",
            Self::BelowMaintainingBalance { .. } => "BELOW_MAINTAINING_BALANCE",
            Self::AlreadyReversed(_) => "ALREADY_REVERSED",
            Self::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => match self {
                Self::AlreadyReversed(_) => 409,
                _ => 422,
            },
            ErrorKind::Transient => 503,
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
