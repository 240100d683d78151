//! Ledger entry domain types.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use coopbooks_shared::types::{
    AccountId, BranchId, LedgerEntryId, LoanTransactionId, MediaId, MemberJointAccountId,
    MemberProfileId, OrganizationId, PaymentTypeId, TransactionId, UserId,
};

use super::balance::DebitCredit;
use super::types::{EntrySide, EntrySource};

/// Prefix marking the description of a reversal entry.
pub const REVERSAL_PREFIX: &str = "REVERSAL: ";

/// One immutable debit-or-credit fact tied to an account.
///
/// Entries are append-only. The print number is the only field ever written
/// after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique identifier for this entry.
    pub id: LedgerEntryId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Owning branch.
    pub branch_id: BranchId,
    /// The account affected by this entry.
    pub account_id: AccountId,
    /// Member the entry belongs to.
    pub member_profile_id: Option<MemberProfileId>,
    /// Joint account holder who transacted.
    pub member_joint_account_id: Option<MemberJointAccountId>,
    /// Teller transaction grouping this entry.
    pub transaction_id: Option<TransactionId>,
    /// Related loan transaction.
    pub loan_transaction_id: Option<LoanTransactionId>,
    /// Intent of the entry.
    pub source: EntrySource,
    /// Debit amount (zero for credits).
    pub debit: Decimal,
    /// Credit amount (zero for debits).
    pub credit: Decimal,
    /// Entry date.
    pub entry_date: NaiveDate,
    /// Free-text description.
    pub description: Option<String>,
    /// Official receipt or voucher number.
    pub reference_number: Option<String>,
    /// Bank reference.
    pub bank_reference: Option<String>,
    /// Payment type.
    pub payment_type_id: Option<PaymentTypeId>,
    /// Proof-of-payment attachment.
    pub proof_of_payment_media_id: Option<MediaId>,
    /// Signature attachment.
    pub signature_media_id: Option<MediaId>,
    /// Passbook print number within the member+account+branch sequence.
    pub print_number: Option<i64>,
    /// The entry this one reverses.
    pub reverses_entry_id: Option<LedgerEntryId>,
    /// User who posted the entry.
    pub created_by: UserId,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Returns the side carrying the amount.
    #[must_use]
    pub fn side(&self) -> EntrySide {
        if self.debit > Decimal::ZERO {
            EntrySide::Debit
        } else {
            EntrySide::Credit
        }
    }

    /// Returns the non-zero amount.
    #[must_use]
    pub fn amount(&self) -> Decimal {
        match self.side() {
            EntrySide::Debit => self.debit,
            EntrySide::Credit => self.credit,
        }
    }

    /// Returns true if this entry reverses another.
    #[must_use]
    pub fn is_reversal(&self) -> bool {
        self.reverses_entry_id.is_some()
    }
}

impl DebitCredit for LedgerEntry {
    fn debit(&self) -> Decimal {
        self.debit
    }

    fn credit(&self) -> Decimal {
        self.credit
    }
}
