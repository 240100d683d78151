//! Ledger domain types for posting requests.
//!
//! The acting user and their organization/branch scope travel explicitly with
//! every call as an [`Actor`]; nothing is read from ambient request state.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use coopbooks_shared::types::{
    AccountId, BranchId, LoanTransactionId, MediaId, MemberJointAccountId,
    MemberProfileId, OrganizationId, PaymentTypeId, TransactionId, UserId,
};

/// Side of a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySide {
    /// Debit. Lowers a credit-positive balance.
    Debit,
    /// Credit. Raises a credit-positive balance.
    Credit,
}

impl EntrySide {
    /// Returns the other side.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Debit => Self::Credit,
            Self::Credit => Self::Debit,
        }
    }
}

/// Intent of a posting. Does not change debit/credit mechanics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    /// Member payment (loan amortization, fees).
    Payment,
    /// Cash withdrawal from a member account.
    Withdraw,
    /// Cash deposit to a member account.
    Deposit,
    /// Journal voucher.
    JournalVoucher,
    /// Check voucher.
    CheckVoucher,
    /// Manual adjustment.
    Adjustment,
    /// Loan release.
    Loan,
    /// Cash disbursement from a teller batch.
    Disbursement,
    /// One leg of an account-to-account transfer.
    Transfer,
}

impl EntrySource {
    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::Withdraw => "withdraw",
            Self::Deposit => "deposit",
            Self::JournalVoucher => "journal_voucher",
            Self::CheckVoucher => "check_voucher",
            Self::Adjustment => "adjustment",
            Self::Loan => "loan",
            Self::Disbursement => "disbursement",
            Self::Transfer => "transfer",
        }
    }

    /// Sources whose debits draw down a member's funds and are subject to the
    /// balance policy.
    #[must_use]
    pub const fn draws_down_balance(self) -> bool {
        matches!(self, Self::Withdraw | Self::Transfer)
    }
}

impl std::fmt::Display for EntrySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntrySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment" => Ok(Self::Payment),
            "withdraw" => Ok(Self::Withdraw),
            "deposit" => Ok(Self::Deposit),
            "journal_voucher" => Ok(Self::JournalVoucher),
            "check_voucher" => Ok(Self::CheckVoucher),
            "adjustment" => Ok(Self::Adjustment),
            "loan" => Ok(Self::Loan),
            "disbursement" => Ok(Self::Disbursement),
            "transfer" => Ok(Self::Transfer),
            _ => Err(format!("Unknown entry source: {s}")),
        }
    }
}

/// Withdrawal limits taken from the acting user's settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancePolicy {
    /// Permit a withdrawal to leave the balance below zero.
    pub allow_negative_balance: bool,
    /// Permit a withdrawal to leave the balance at exactly zero.
    pub allow_exact_balance: bool,
    /// Floor the balance must stay at or above after a withdrawal.
    /// Ignored when negative balances are allowed.
    pub maintaining_balance: Option<Decimal>,
}

impl Default for BalancePolicy {
    fn default() -> Self {
        Self {
            allow_negative_balance: false,
            allow_exact_balance: true,
            maintaining_balance: None,
        }
    }
}

/// The authenticated user and the organization/branch scope they act in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// The acting user.
    pub user_id: UserId,
    /// Organization scope.
    pub organization_id: OrganizationId,
    /// Branch scope.
    pub branch_id: BranchId,
    /// Withdrawal policy from the user's settings.
    #[serde(default)]
    pub balance_policy: BalancePolicy,
}

impl Actor {
    /// Creates an actor with the default balance policy.
    #[must_use]
    pub fn new(user_id: UserId, organization_id: OrganizationId, branch_id: BranchId) -> Self {
        Self {
            user_id,
            organization_id,
            branch_id,
            balance_policy: BalancePolicy::default(),
        }
    }

    /// Replaces the balance policy.
    #[must_use]
    pub fn with_balance_policy(mut self, balance_policy: BalancePolicy) -> Self {
        self.balance_policy = balance_policy;
        self
    }

    /// Returns true if the given organization/branch pair is this actor's scope.
    #[must_use]
    pub fn owns(&self, organization_id: OrganizationId, branch_id: BranchId) -> bool {
        self.organization_id == organization_id && self.branch_id == branch_id
    }
}

/// A validated request payload for one ledger posting.
///
/// Exactly one of `debit`/`credit` must be positive; `LedgerService::validate_amounts`
/// rejects anything else before the entry is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingRequest {
    /// The account to post to.
    pub account_id: AccountId,
    /// Debit amount.
    pub debit: Decimal,
    /// Credit amount.
    pub credit: Decimal,
    /// Intent of the posting.
    pub source: EntrySource,
    /// Member the posting belongs to.
    pub member_profile_id: Option<MemberProfileId>,
    /// Joint account holder acting for the member.
    pub member_joint_account_id: Option<MemberJointAccountId>,
    /// Teller transaction grouping this posting with others.
    pub transaction_id: Option<TransactionId>,
    /// Loan transaction this posting relates to.
    pub loan_transaction_id: Option<LoanTransactionId>,
    /// Entry date; defaults to today.
    pub entry_date: Option<NaiveDate>,
    /// Free-text description.
    pub description: Option<String>,
    /// Official receipt or voucher number.
    pub reference_number: Option<String>,
    /// Bank reference for deposits made through a bank.
    pub bank_reference: Option<String>,
    /// Payment type (cash, check, online).
    pub payment_type_id: Option<PaymentTypeId>,
    /// Proof-of-payment attachment.
    pub proof_of_payment_media_id: Option<MediaId>,
    /// Signature attachment.
    pub signature_media_id: Option<MediaId>,
}

impl PostingRequest {
    /// Creates a request from raw debit/credit amounts.
    #[must_use]
    pub fn new(account_id: AccountId, debit: Decimal, credit: Decimal, source: EntrySource) -> Self {
        Self {
            account_id,
            debit,
            credit,
            source,
            member_profile_id: None,
            member_joint_account_id: None,
            transaction_id: None,
            loan_transaction_id: None,
            entry_date: None,
            description: None,
            reference_number: None,
            bank_reference: None,
            payment_type_id: None,
            proof_of_payment_media_id: None,
            signature_media_id: None,
        }
    }

    /// Creates a debit posting.
    #[must_use]
    pub fn debit(account_id: AccountId, amount: Decimal, source: EntrySource) -> Self {
        Self::new(account_id, amount, Decimal::ZERO, source)
    }

    /// Creates a credit posting.
    #[must_use]
    pub fn credit(account_id: AccountId, amount: Decimal, source: EntrySource) -> Self {
        Self::new(account_id, Decimal::ZERO, amount, source)
    }

    /// Attaches the posting to a member.
    #[must_use]
    pub fn for_member(mut self, member_profile_id: MemberProfileId) -> Self {
        self.member_profile_id = Some(member_profile_id);
        self
    }

    /// Records the joint account holder who transacted.
    #[must_use]
    pub fn by_joint_account(mut self, member_joint_account_id: MemberJointAccountId) -> Self {
        self.member_joint_account_id = Some(member_joint_account_id);
        self
    }

    /// Groups the posting under a teller transaction.
    #[must_use]
    pub fn in_transaction(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    /// Links the posting to a loan transaction.
    #[must_use]
    pub fn for_loan(mut self, loan_transaction_id: LoanTransactionId) -> Self {
        self.loan_transaction_id = Some(loan_transaction_id);
        self
    }

    /// Sets the entry date.
    #[must_use]
    pub fn on(mut self, entry_date: NaiveDate) -> Self {
        self.entry_date = Some(entry_date);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the reference number.
    #[must_use]
    pub fn with_reference(mut self, reference_number: impl Into<String>) -> Self {
        self.reference_number = Some(reference_number.into());
        self
    }

    /// Sets the bank reference.
    #[must_use]
    pub fn with_bank_reference(mut self, bank_reference: impl Into<String>) -> Self {
        self.bank_reference = Some(bank_reference.into());
        self
    }

    /// Sets the payment type.
    #[must_use]
    pub fn with_payment_type(mut self, payment_type_id: PaymentTypeId) -> Self {
        self.payment_type_id = Some(payment_type_id);
        self
    }

    /// Sets the proof-of-payment and signature attachments.
    #[must_use]
    pub fn with_attachments(
        mut self,
        proof_of_payment_media_id: Option<MediaId>,
        signature_media_id: Option<MediaId>,
    ) -> Self {
        self.proof_of_payment_media_id = proof_of_payment_media_id;
        self.signature_media_id = signature_media_id;
        self
    }
}

/// Input for moving funds between two accounts as a matched pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Account debited.
    pub from_account_id: AccountId,
    /// Account credited.
    pub to_account_id: AccountId,
    /// Amount moved.
    pub amount: Decimal,
    /// Member owning both legs.
    pub member_profile_id: Option<MemberProfileId>,
    /// Teller transaction the pair belongs to. Created when absent.
    pub transaction_id: Option<TransactionId>,
    /// Entry date; defaults to today.
    pub entry_date: Option<NaiveDate>,
    /// Description copied to both legs.
    pub description: Option<String>,
    /// Reference number copied to both legs.
    pub reference_number: Option<String>,
}

/// Scope and currency of a stored account, as needed for validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountInfo {
    /// The account ID.
    pub id: AccountId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Owning branch.
    pub branch_id: BranchId,
    /// Account currency.
    pub currency: coopbooks_shared::types::Currency,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[test]
    fn test_side_opposite() {
        assert_eq!(EntrySide::Debit.opposite(), EntrySide::Credit);
        assert_eq!(EntrySide::Credit.opposite(), EntrySide::Debit);
    }

    #[test]
    fn test_source_round_trip() {
        for source in [
            EntrySource::Payment,
            EntrySource::Withdraw,
            EntrySource::Deposit,
            EntrySource::JournalVoucher,
            EntrySource::CheckVoucher,
            EntrySource::Adjustment,
            EntrySource::Loan,
            EntrySource::Disbursement,
            EntrySource::Transfer,
        ] {
            assert_eq!(EntrySource::from_str(source.as_str()).unwrap(), source);
        }
        assert!(EntrySource::from_str("refund").is_err());
    }

    #[test]
    fn test_only_withdrawals_and_transfers_draw_down() {
        assert!(EntrySource::Withdraw.draws_down_balance());
        assert!(EntrySource::Transfer.draws_down_balance());
        assert!(!EntrySource::Deposit.draws_down_balance());
        assert!(!EntrySource::Payment.draws_down_balance());
    }

    #[test]
    fn test_actor_scope() {
        let actor = Actor::new(UserId::new(), OrganizationId::new(), BranchId::new());
        assert!(actor.owns(actor.organization_id, actor.branch_id));
        assert!(!actor.owns(actor.organization_id, BranchId::new()));
        assert!(!actor.owns(OrganizationId::new(), actor.branch_id));
        assert_eq!(actor.balance_policy, BalancePolicy::default());
    }

    #[test]
    fn test_request_builders() {
        let account = AccountId::new();
        let member = MemberProfileId::new();
        let request = PostingRequest::credit(account, dec!(500.00), EntrySource::Deposit)
            .for_member(member)
            .describe("Savings deposit")
            .with_reference("OR-0001");

        assert_eq!(request.debit, Decimal::ZERO);
        assert_eq!(request.credit, dec!(500.00));
        assert_eq!(request.member_profile_id, Some(member));
        assert_eq!(request.description.as_deref(), Some("Savings deposit"));
        assert_eq!(request.reference_number.as_deref(), Some("OR-0001"));
    }
}
