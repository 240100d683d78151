//! Loan transaction domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use coopbooks_shared::types::{
    AccountId, BranchId, LoanTransactionEntryId, LoanTransactionId, MemberProfileId,
    OrganizationId, UserId,
};

use crate::ledger::DebitCredit;

/// Kind of loan transaction line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanEntryType {
    /// Manually added deduction. Hard-deleted.
    Deduction,
    /// Deduction generated from the loan product's charges. Soft-deleted and restorable.
    AutomaticDeduction,
    /// Receivable and cash-release lines maintained by the balancer.
    Other,
}

impl LoanEntryType {
    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deduction => "deduction",
            Self::AutomaticDeduction => "automatic_deduction",
            Self::Other => "other",
        }
    }

    /// Parses the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deduction" => Some(Self::Deduction),
            "automatic_deduction" => Some(Self::AutomaticDeduction),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Returns true for manual and automatic deductions.
    #[must_use]
    pub const fn is_deduction(self) -> bool {
        matches!(self, Self::Deduction | Self::AutomaticDeduction)
    }
}

impl fmt::Display for LoanEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of a loan transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTransactionEntry {
    /// Line ID.
    pub id: LoanTransactionEntryId,
    /// Owning loan.
    pub loan_transaction_id: LoanTransactionId,
    /// Account the line is booked to.
    pub account_id: AccountId,
    /// Line kind.
    pub entry_type: LoanEntryType,
    /// Display name, e.g. "Service fee".
    pub name: String,
    /// Free-text description.
    pub description: Option<String>,
    /// Debit amount.
    pub debit: Decimal,
    /// Credit amount.
    pub credit: Decimal,
    /// Deduction is added to the principal instead of taken from proceeds.
    pub is_add_on: bool,
    /// Automatic deduction hidden from totals but kept for restore.
    pub is_automatic_deduction_deleted: bool,
}

impl LoanTransactionEntry {
    /// Returns true if the line counts toward totals.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_automatic_deduction_deleted
    }
}

impl DebitCredit for LoanTransactionEntry {
    fn debit(&self) -> Decimal {
        self.debit
    }

    fn credit(&self) -> Decimal {
        self.credit
    }
}

/// Derived totals of a loan, always the fold of its active lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTotals {
    /// `applied_amount + total_add_on`.
    pub principal: Decimal,
    /// Σ non-add-on deductions.
    pub total_deductions: Decimal,
    /// Σ non-add-on automatic deductions.
    pub total_automatic_deductions: Decimal,
    /// Σ non-add-on manual deductions.
    pub total_manual_deductions: Decimal,
    /// Σ add-on deductions.
    pub total_add_on: Decimal,
    /// Cash released to the member.
    pub net_proceeds: Decimal,
    /// Σ debits of active lines.
    pub total_debit: Decimal,
    /// Σ credits of active lines.
    pub total_credit: Decimal,
}

/// An approved loan's ledger header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTransaction {
    /// Loan ID.
    pub id: LoanTransactionId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Owning branch.
    pub branch_id: BranchId,
    /// Borrowing member.
    pub member_profile_id: MemberProfileId,
    /// Amount approved for release.
    pub applied_amount: Decimal,
    /// Loans receivable account.
    pub receivable_account_id: AccountId,
    /// Cash account the proceeds are released from.
    pub cash_account_id: AccountId,
    /// Recomputed totals.
    #[serde(flatten)]
    pub totals: LoanTotals,
    /// User who set the loan up.
    pub created_by: UserId,
    /// Last recomputation time.
    pub updated_at: DateTime<Utc>,
}

/// A deduction to add to a loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductionInput {
    /// Account credited with the deduction.
    pub account_id: AccountId,
    /// Display name.
    pub name: String,
    /// Deduction amount.
    pub amount: Decimal,
    /// Add to principal instead of deducting from proceeds.
    #[serde(default)]
    pub is_add_on: bool,
    /// Free-text description.
    pub description: Option<String>,
}

/// Input for setting up a loan's ledger lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanSetupInput {
    /// Borrowing member.
    pub member_profile_id: MemberProfileId,
    /// Amount approved for release.
    pub applied_amount: Decimal,
    /// Loans receivable account.
    pub receivable_account_id: AccountId,
    /// Cash account.
    pub cash_account_id: AccountId,
    /// Charges generated from the loan product.
    #[serde(default)]
    pub automatic_deductions: Vec<DeductionInput>,
}

/// A line to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoanEntry {
    /// Account.
    pub account_id: AccountId,
    /// Line kind.
    pub entry_type: LoanEntryType,
    /// Display name.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// Debit amount.
    pub debit: Decimal,
    /// Credit amount.
    pub credit: Decimal,
    /// Add-on flag.
    pub is_add_on: bool,
}

/// New amounts for a generated line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineUpdate {
    /// Line to rewrite.
    pub entry_id: LoanTransactionEntryId,
    /// New debit.
    pub debit: Decimal,
    /// New credit.
    pub credit: Decimal,
}

/// Result of balancing a loan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalancedLoan {
    /// Totals to persist on the header.
    pub totals: LoanTotals,
    /// Generated lines whose amounts changed.
    pub updates: Vec<LineUpdate>,
}
