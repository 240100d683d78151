//! Property-based tests for balance aggregation and posting validation.
//!
//! - Balance equals Σcredit − Σdebit for any entry set
//! - Original plus reversal nets to the pre-posting balance
//! - Only postings with exactly one positive side validate

use proptest::prelude::*;
use rust_decimal::Decimal;
use coopbooks_shared::types::Currency;

use super::balance::{BalanceSummary, aggregate, reversal_of};
use super::error::LedgerError;
use super::service::LedgerService;
use super::types::{BalancePolicy, EntrySide};

/// Strategy to generate positive decimal amounts (0.01 to 10,000.00).
fn positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy to generate one valid posting as a (debit, credit) pair.
fn posting() -> impl Strategy<Value = (Decimal, Decimal)> {
    (positive_amount(), any::<bool>()).prop_map(|(amount, is_debit)| {
        if is_debit {
            (amount, Decimal::ZERO)
        } else {
            (Decimal::ZERO, amount)
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_balance_is_credit_minus_debit(entries in prop::collection::vec(posting(), 0..60)) {
        let summary = aggregate(entries.iter().copied());

        let mut debit = Decimal::ZERO;
        let mut credit = Decimal::ZERO;
        for (d, c) in &entries {
            debit += *d;
            credit += *c;
        }

        prop_assert_eq!(summary.total_debit, debit);
        prop_assert_eq!(summary.total_credit, credit);
        prop_assert_eq!(summary.balance, credit - debit);
    }

    #[test]
    fn prop_reversal_restores_prior_balance(
        prior in prop::collection::vec(posting(), 0..30),
        target in posting(),
    ) {
        let before = aggregate(prior.iter().copied());

        let mut all = prior.clone();
        all.push(target);
        all.push(reversal_of(target.0, target.1));
        let after = aggregate(all);

        prop_assert_eq!(after.balance, before.balance);
    }

    #[test]
    fn prop_aggregation_is_order_independent(mut entries in prop::collection::vec(posting(), 0..40)) {
        let forward = aggregate(entries.iter().copied());
        entries.reverse();
        prop_assert_eq!(aggregate(entries), forward);
    }

    #[test]
    fn prop_exactly_one_side_validates(debit in positive_amount(), credit in positive_amount()) {
        prop_assert!(LedgerService::validate_amounts(debit, Decimal::ZERO, Currency::Php).is_ok());
        prop_assert!(LedgerService::validate_amounts(Decimal::ZERO, credit, Currency::Php).is_ok());
        prop_assert!(matches!(
            LedgerService::validate_amounts(debit, credit, Currency::Php),
            Err(LedgerError::InvalidEntryType)
        ));
        prop_assert!(matches!(
            LedgerService::validate_amounts(-debit, Decimal::ZERO, Currency::Php),
            Err(LedgerError::NegativeAmount)
        ));
    }

    #[test]
    fn prop_policy_never_admits_negative_by_default(
        balance in positive_amount(),
        amount in positive_amount(),
    ) {
        let current = BalanceSummary::from_totals(Decimal::ZERO, balance);
        let result = LedgerService::check_balance_policy(&BalancePolicy::default(), &current, amount);

        if amount > balance {
            prop_assert!(
                matches!(result, Err(LedgerError::NegativeBalanceNotAllowed { .. })),
                "expected negative balance rejection"
            );
        } else {
            prop_assert_eq!(result.ok(), Some(current.project(EntrySide::Debit, amount)));
        }
    }
}
