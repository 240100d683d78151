//! Transaction batch domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use coopbooks_shared::types::{
    AccountId, BranchId, CashCountId, Currency, DisbursementTransactionId, LedgerEntryId,
    OrganizationId, TransactionBatchId, UserId,
};

/// A teller's working period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBatch {
    /// Batch ID.
    pub id: TransactionBatchId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Owning branch.
    pub branch_id: BranchId,
    /// Teller who opened the batch.
    pub employee_user_id: UserId,
    /// Batch currency.
    pub currency: Currency,
    /// Declared deposit-in-bank amount.
    pub deposit_in_bank: Decimal,
    /// Sum of cash count lines.
    pub cash_count_total: Decimal,
    /// `cash_count_total + deposit_in_bank`.
    pub grand_total: Decimal,
    /// Sum of disbursement lines.
    pub total_disbursement: Decimal,
    /// Whether the teller ended the batch.
    pub is_closed: bool,
    /// When the batch was opened.
    pub started_at: DateTime<Utc>,
    /// When the batch was ended.
    pub ended_at: Option<DateTime<Utc>>,
}

impl TransactionBatch {
    /// Returns the stored totals.
    #[must_use]
    pub fn totals(&self) -> BatchTotals {
        BatchTotals {
            cash_count_total: self.cash_count_total,
            deposit_in_bank: self.deposit_in_bank,
            grand_total: self.grand_total,
            total_disbursement: self.total_disbursement,
        }
    }
}

/// Recomputed batch totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTotals {
    /// Σ cash count amounts.
    pub cash_count_total: Decimal,
    /// Declared deposit-in-bank.
    pub deposit_in_bank: Decimal,
    /// `cash_count_total + deposit_in_bank`.
    pub grand_total: Decimal,
    /// Σ disbursement amounts.
    pub total_disbursement: Decimal,
}

/// One denomination line of a cash count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashCountLine {
    /// Line ID.
    pub id: CashCountId,
    /// Owning batch.
    pub transaction_batch_id: TransactionBatchId,
    /// Denomination.
    pub bill_amount: Decimal,
    /// Number of bills or coins.
    pub quantity: i32,
    /// `bill_amount × quantity`.
    pub amount: Decimal,
    /// Optional label, e.g. "1000 peso bill".
    pub name: Option<String>,
}

/// Input for creating or replacing a cash count line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashCountInput {
    /// Denomination.
    pub bill_amount: Decimal,
    /// Number of bills or coins.
    pub quantity: i32,
    /// Optional label.
    pub name: Option<String>,
}

impl CashCountInput {
    /// Creates an unlabeled line.
    #[must_use]
    pub fn new(bill_amount: Decimal, quantity: i32) -> Self {
        Self {
            bill_amount,
            quantity,
            name: None,
        }
    }
}

/// A cash disbursement paid out of the teller's drawer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisbursementLine {
    /// Line ID.
    pub id: DisbursementTransactionId,
    /// Owning batch.
    pub transaction_batch_id: TransactionBatchId,
    /// Amount paid out.
    pub amount: Decimal,
    /// What the cash was paid for.
    pub description: Option<String>,
    /// Voucher number.
    pub reference_number: Option<String>,
    /// Expense account charged, when the payout is booked.
    pub account_id: Option<AccountId>,
    /// Ledger entry that booked the payout.
    pub ledger_entry_id: Option<LedgerEntryId>,
}

/// Input for creating or editing a disbursement line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisbursementInput {
    /// Amount paid out.
    pub amount: Decimal,
    /// What the cash was paid for.
    pub description: Option<String>,
    /// Voucher number.
    pub reference_number: Option<String>,
    /// Expense account to debit. `None` keeps the line a drawer declaration only.
    pub account_id: Option<AccountId>,
}

impl DisbursementInput {
    /// Creates an unbooked disbursement.
    #[must_use]
    pub fn new(amount: Decimal) -> Self {
        Self {
            amount,
            description: None,
            reference_number: None,
            account_id: None,
        }
    }

    /// Books the payout against `account_id`.
    #[must_use]
    pub fn charged_to(mut self, account_id: AccountId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Input for opening a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenBatchInput {
    /// Batch currency.
    pub currency: Currency,
    /// Opening deposit-in-bank declaration.
    pub deposit_in_bank: Decimal,
}
