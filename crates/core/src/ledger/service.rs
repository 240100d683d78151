//! Ledger service for posting validation and reversal derivation.
//!
//! Pure business logic with no database dependencies. The db crate loads
//! accounts, entries, and running balances, then calls into this service to
//! decide whether and what to write.

use std::fmt::Display;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use coopbooks_shared::types::{BranchId, Currency, OrganizationId, fits_amount_column};

use super::balance::{BalanceSummary, reversal_of};
use super::entry::{LedgerEntry, REVERSAL_PREFIX};
use super::error::LedgerError;
use super::types::{
    Actor, BalancePolicy, EntrySide, EntrySource, PostingRequest, TransferRequest,
};

/// Ledger service for posting validation.
pub struct LedgerService;

impl LedgerService {
    /// Validates a debit/credit pair and returns the side and amount posted.
    ///
    /// Exactly one side must be positive, fit the amount column, and fit the
    /// currency's minor unit.
    ///
    /// # Errors
    ///
    /// Returns `NegativeAmount`, `ZeroAmount`, `InvalidEntryType`,
    /// `AmountOutOfRange`, or `ExcessPrecision`.
    pub fn validate_amounts(
        debit: Decimal,
        credit: Decimal,
        currency: Currency,
    ) -> Result<(EntrySide, Decimal), LedgerError> {
        if debit < Decimal::ZERO || credit < Decimal::ZERO {
            return Err(LedgerError::NegativeAmount);
        }

        let (side, amount) = match (debit.is_zero(), credit.is_zero()) {
            (true, true) => return Err(LedgerError::ZeroAmount),
            (false, false) => return Err(LedgerError::InvalidEntryType),
            (false, true) => (EntrySide::Debit, debit),
            (true, false) => (EntrySide::Credit, credit),
        };

        if !fits_amount_column(amount) {
            return Err(LedgerError::AmountOutOfRange(amount));
        }
        if !currency.fits_precision(amount) {
            return Err(LedgerError::ExcessPrecision {
                amount,
                currency: currency.code(),
            });
        }

        Ok((side, amount))
    }

    /// Rejects a record whose organization/branch is not the actor's.
    ///
    /// # Errors
    ///
    /// Returns `CrossTenantReference` naming the record.
    pub fn ensure_in_scope(
        actor: &Actor,
        entity: &'static str,
        id: impl Display,
        organization_id: OrganizationId,
        branch_id: BranchId,
    ) -> Result<(), LedgerError> {
        if actor.owns(organization_id, branch_id) {
            Ok(())
        } else {
            Err(LedgerError::CrossTenantReference {
                entity,
                id: id.to_string(),
            })
        }
    }

    /// Returns true if a posting must pass the balance policy.
    #[must_use]
    pub fn requires_policy_check(side: EntrySide, source: EntrySource) -> bool {
        side == EntrySide::Debit && source.draws_down_balance()
    }

    /// Checks a withdrawal against the actor's balance policy.
    ///
    /// Returns the projected balance on success.
    ///
    /// # Errors
    ///
    /// Returns the policy error naming the violated rule.
    pub fn check_balance_policy(
        policy: &BalancePolicy,
        current: &BalanceSummary,
        amount: Decimal,
    ) -> Result<Decimal, LedgerError> {
        let balance_after = current.project(EntrySide::Debit, amount);

        if balance_after < Decimal::ZERO && !policy.allow_negative_balance {
            return Err(LedgerError::NegativeBalanceNotAllowed { balance_after });
        }
        if balance_after.is_zero() && !policy.allow_exact_balance {
            return Err(LedgerError::ExactBalanceNotAllowed);
        }
        if !policy.allow_negative_balance
            && let Some(maintaining_balance) = policy.maintaining_balance
            && balance_after < maintaining_balance
        {
            return Err(LedgerError::BelowMaintainingBalance {
                balance_after,
                maintaining_balance,
            });
        }

        Ok(balance_after)
    }

    /// Builds the posting that reverses `original`.
    ///
    /// Debit and credit are swapped; source and every reference are copied.
    ///
    /// # Errors
    ///
    /// Returns `CannotReverseReversal` if `original` is itself a reversal.
    pub fn reversal_request(
        original: &LedgerEntry,
        reason: Option<&str>,
        entry_date: NaiveDate,
    ) -> Result<PostingRequest, LedgerError> {
        if original.is_reversal() {
            return Err(LedgerError::CannotReverseReversal(original.id));
        }

        let (debit, credit) = reversal_of(original.debit, original.credit);

        Ok(PostingRequest {
            account_id: original.account_id,
            debit,
            credit,
            source: original.source,
            member_profile_id: original.member_profile_id,
            member_joint_account_id: original.member_joint_account_id,
            transaction_id: original.transaction_id,
            loan_transaction_id: original.loan_transaction_id,
            entry_date: Some(entry_date),
            description: Some(Self::reversal_description(
                original.description.as_deref(),
                reason,
            )),
            reference_number: original.reference_number.clone(),
            bank_reference: original.bank_reference.clone(),
            payment_type_id: original.payment_type_id,
            proof_of_payment_media_id: original.proof_of_payment_media_id,
            signature_media_id: original.signature_media_id,
        })
    }

    /// Description for a reversal entry.
    #[must_use]
    pub fn reversal_description(original: Option<&str>, reason: Option<&str>) -> String {
        let mut description = format!("{REVERSAL_PREFIX}{}", original.unwrap_or_default());
        if let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) {
            description.push_str(" | ");
            description.push_str(reason);
        }
        description
    }

    /// Next number in a print sequence given the current maximum.
    #[must_use]
    pub fn next_print_number(current_max: Option<i64>) -> i64 {
        current_max.map_or(1, |max| max + 1)
    }

    /// Splits a transfer into its debit and credit legs.
    ///
    /// # Errors
    ///
    /// Returns `SameAccountTransfer` when both legs hit one account.
    pub fn transfer_requests(
        transfer: &TransferRequest,
    ) -> Result<[PostingRequest; 2], LedgerError> {
        if transfer.from_account_id == transfer.to_account_id {
            return Err(LedgerError::SameAccountTransfer);
        }

        let leg = |request: PostingRequest| PostingRequest {
            member_profile_id: transfer.member_profile_id,
            transaction_id: transfer.transaction_id,
            entry_date: transfer.entry_date,
            description: transfer.description.clone(),
            reference_number: transfer.reference_number.clone(),
            ..request
        };

        Ok([
            leg(PostingRequest::debit(
                transfer.from_account_id,
                transfer.amount,
                EntrySource::Transfer,
            )),
            leg(PostingRequest::credit(
                transfer.to_account_id,
                transfer.amount,
                EntrySource::Transfer,
            )),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;
    use rust_decimal_macros::dec;
    use coopbooks_shared::types::{
        AccountId, LedgerEntryId, MemberProfileId, TransactionId, UserId,
    };

    fn actor() -> Actor {
        Actor::new(UserId::new(), OrganizationId::new(), BranchId::new())
    }

    fn entry(debit: Decimal, credit: Decimal, source: EntrySource) -> LedgerEntry {
        let actor = actor();
        LedgerEntry {
            id: LedgerEntryId::new(),
            organization_id: actor.organization_id,
            branch_id: actor.branch_id,
            account_id: AccountId::new(),
            member_profile_id: Some(MemberProfileId::new()),
            member_joint_account_id: None,
            transaction_id: Some(TransactionId::new()),
            loan_transaction_id: None,
            source,
            debit,
            credit,
            entry_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            description: Some("Cash withdrawal".to_string()),
            reference_number: Some("WD-0042".to_string()),
            bank_reference: None,
            payment_type_id: None,
            proof_of_payment_media_id: None,
            signature_media_id: None,
            print_number: Some(7),
            reverses_entry_id: None,
            created_by: actor.user_id,
            created_at: Utc::now(),
        }
    }

    #[rstest]
    #[case(dec!(100.00), dec!(0), EntrySide::Debit, dec!(100.00))]
    #[case(dec!(0), dec!(0.01), EntrySide::Credit, dec!(0.01))]
    #[case(dec!(0.00), dec!(25.5), EntrySide::Credit, dec!(25.5))]
    fn test_valid_amounts(
        #[case] debit: Decimal,
        #[case] credit: Decimal,
        #[case] side: EntrySide,
        #[case] amount: Decimal,
    ) {
        let result = LedgerService::validate_amounts(debit, credit, Currency::Php).unwrap();
        assert_eq!(result, (side, amount));
    }

    #[test]
    fn test_invalid_amounts() {
        assert!(matches!(
            LedgerService::validate_amounts(dec!(0), dec!(0), Currency::Php),
            Err(LedgerError::ZeroAmount)
        ));
        assert!(matches!(
            LedgerService::validate_amounts(dec!(10), dec!(10), Currency::Php),
            Err(LedgerError::InvalidEntryType)
        ));
        assert!(matches!(
            LedgerService::validate_amounts(dec!(-10), dec!(0), Currency::Php),
            Err(LedgerError::NegativeAmount)
        ));
        assert!(matches!(
            LedgerService::validate_amounts(dec!(0), dec!(1.005), Currency::Php),
            Err(LedgerError::ExcessPrecision { .. })
        ));
        assert!(matches!(
            LedgerService::validate_amounts(dec!(0), dec!(1.5), Currency::Jpy),
            Err(LedgerError::ExcessPrecision { currency: "JPY", .. })
        ));
        assert!(matches!(
            LedgerService::validate_amounts(dec!(0), dec!(1000000000000000), Currency::Php),
            Err(LedgerError::AmountOutOfRange(_))
        ));
        assert!(matches!(
            LedgerService::validate_amounts(Decimal::MAX, dec!(0), Currency::Php),
            Err(LedgerError::AmountOutOfRange(_))
        ));
    }

    #[test]
    fn test_scope_check() {
        let actor = actor();
        let account = AccountId::new();
        assert!(
            LedgerService::ensure_in_scope(
                &actor,
                "account",
                account,
                actor.organization_id,
                actor.branch_id
            )
            .is_ok()
        );

        let err = LedgerService::ensure_in_scope(
            &actor,
            "account",
            account,
            actor.organization_id,
            BranchId::new(),
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::CrossTenantReference { entity: "account", .. }));
    }

    #[test]
    fn test_policy_only_applies_to_withdrawal_debits() {
        assert!(LedgerService::requires_policy_check(EntrySide::Debit, EntrySource::Withdraw));
        assert!(LedgerService::requires_policy_check(EntrySide::Debit, EntrySource::Transfer));
        assert!(!LedgerService::requires_policy_check(EntrySide::Credit, EntrySource::Withdraw));
        assert!(!LedgerService::requires_policy_check(EntrySide::Debit, EntrySource::Payment));
    }

    #[test]
    fn test_default_policy() {
        let policy = BalancePolicy::default();
        let current = BalanceSummary::from_totals(dec!(0), dec!(500));

        assert_eq!(
            LedgerService::check_balance_policy(&policy, &current, dec!(200)).unwrap(),
            dec!(300)
        );
        assert_eq!(
            LedgerService::check_balance_policy(&policy, &current, dec!(500)).unwrap(),
            dec!(0)
        );
        assert!(matches!(
            LedgerService::check_balance_policy(&policy, &current, dec!(500.01)),
            Err(LedgerError::NegativeBalanceNotAllowed { balance_after }) if balance_after == dec!(-0.01)
        ));
    }

    #[test]
    fn test_exact_balance_policy() {
        let policy = BalancePolicy {
            allow_exact_balance: false,
            ..BalancePolicy::default()
        };
        let current = BalanceSummary::from_totals(dec!(0), dec!(500));
        assert!(matches!(
            LedgerService::check_balance_policy(&policy, &current, dec!(500)),
            Err(LedgerError::ExactBalanceNotAllowed)
        ));
    }

    #[test]
    fn test_maintaining_balance() {
        let policy = BalancePolicy {
            maintaining_balance: Some(dec!(100)),
            ..BalancePolicy::default()
        };
        let current = BalanceSummary::from_totals(dec!(0), dec!(500));

        assert!(LedgerService::check_balance_policy(&policy, &current, dec!(400)).is_ok());
        assert!(matches!(
            LedgerService::check_balance_policy(&policy, &current, dec!(400.01)),
            Err(LedgerError::BelowMaintainingBalance { .. })
        ));

        let overdraft = BalancePolicy {
            allow_negative_balance: true,
            ..policy
        };
        assert_eq!(
            LedgerService::check_balance_policy(&overdraft, &current, dec!(800)).unwrap(),
            dec!(-300)
        );
    }

    #[test]
    fn test_reversal_request_swaps_and_copies() {
        let original = entry(dec!(200.00), dec!(0), EntrySource::Withdraw);
        let date = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
        let reversal =
            LedgerService::reversal_request(&original, Some("teller error"), date).unwrap();

        assert_eq!(reversal.debit, dec!(0));
        assert_eq!(reversal.credit, dec!(200.00));
        assert_eq!(reversal.source, EntrySource::Withdraw);
        assert_eq!(reversal.account_id, original.account_id);
        assert_eq!(reversal.member_profile_id, original.member_profile_id);
        assert_eq!(reversal.transaction_id, original.transaction_id);
        assert_eq!(reversal.reference_number, original.reference_number);
        assert_eq!(reversal.entry_date, Some(date));
        assert_eq!(
            reversal.description.as_deref(),
            Some("REVERSAL: Cash withdrawal | teller error")
        );
    }

    #[test]
    fn test_reversal_of_reversal_rejected() {
        let mut original = entry(dec!(0), dec!(200.00), EntrySource::Withdraw);
        original.reverses_entry_id = Some(LedgerEntryId::new());
        let date = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
        assert!(matches!(
            LedgerService::reversal_request(&original, None, date),
            Err(LedgerError::CannotReverseReversal(id)) if id == original.id
        ));
    }

    #[test]
    fn test_reversal_description() {
        assert_eq!(LedgerService::reversal_description(None, None), "REVERSAL: ");
        assert_eq!(
            LedgerService::reversal_description(Some("Deposit"), Some("  ")),
            "REVERSAL: Deposit"
        );
    }

    #[test]
    fn test_next_print_number() {
        assert_eq!(LedgerService::next_print_number(None), 1);
        assert_eq!(LedgerService::next_print_number(Some(41)), 42);
    }

    #[test]
    fn test_transfer_legs() {
        let transfer = TransferRequest {
            from_account_id: AccountId::new(),
            to_account_id: AccountId::new(),
            amount: dec!(750.00),
            member_profile_id: Some(MemberProfileId::new()),
            transaction_id: None,
            entry_date: None,
            description: Some("Savings to time deposit".to_string()),
            reference_number: None,
        };
        let [debit, credit] = LedgerService::transfer_requests(&transfer).unwrap();

        assert_eq!(debit.account_id, transfer.from_account_id);
        assert_eq!(debit.debit, dec!(750.00));
        assert_eq!(credit.account_id, transfer.to_account_id);
        assert_eq!(credit.credit, dec!(750.00));
        assert_eq!(debit.member_profile_id, transfer.member_profile_id);
        assert_eq!(credit.description, transfer.description);

        let same = TransferRequest {
            to_account_id: transfer.from_account_id,
            ..transfer
        };
        assert!(matches!(
            LedgerService::transfer_requests(&same),
            Err(LedgerError::SameAccountTransfer)
        ));
    }
}
