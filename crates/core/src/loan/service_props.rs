//! Property-based tests for the loan balancer.

use proptest::prelude::*;
use rust_decimal::Decimal;
use coopbooks_shared::types::{
    AccountId, Currency, LoanTransactionEntryId, LoanTransactionId, MemberProfileId,
};

use super::service::LoanService;
use super::types::{DeductionInput, LoanEntryType, LoanSetupInput, LoanTransactionEntry};

fn amount(max_cents: i64) -> impl Strategy<Value = Decimal> {
    (1i64..max_cents).prop_map(|cents| Decimal::new(cents, 2))
}

fn deduction() -> impl Strategy<Value = (bool, bool, Decimal)> {
    (any::<bool>(), any::<bool>(), amount(50_000))
}

fn build(
    applied: Decimal,
    deductions: &[(bool, bool, Decimal)],
) -> (AccountId, AccountId, Vec<LoanTransactionEntry>) {
    let input = LoanSetupInput {
        member_profile_id: MemberProfileId::new(),
        applied_amount: applied,
        receivable_account_id: AccountId::new(),
        cash_account_id: AccountId::new(),
        automatic_deductions: vec![],
    };
    let mut lines = LoanService::setup_entries(&input, Currency::Php).unwrap();
    for (automatic, add_on, value) in deductions {
        let kind = if *automatic {
            LoanEntryType::AutomaticDeduction
        } else {
            LoanEntryType::Deduction
        };
        lines.push(LoanService::deduction_entry(
            &DeductionInput {
                account_id: AccountId::new(),
                name: "Fee".to_string(),
                amount: *value,
                is_add_on: *add_on,
                description: None,
            },
            kind,
        ));
    }

    let loan = LoanTransactionId::new();
    let entries = lines
        .into_iter()
        .map(|e| LoanTransactionEntry {
            id: LoanTransactionEntryId::new(),
            loan_transaction_id: loan,
            account_id: e.account_id,
            entry_type: e.entry_type,
            name: e.name,
            description: e.description,
            debit: e.debit,
            credit: e.credit,
            is_add_on: e.is_add_on,
            is_automatic_deduction_deleted: false,
        })
        .collect();
    (input.receivable_account_id, input.cash_account_id, entries)
}

proptest! {
    /// A balanced loan always has equal debits and credits, and
    /// net proceeds = applied amount − non-add-on deductions.
    #[test]
    fn test_balanced_loan_is_balanced(
        applied in amount(10_000_000),
        deductions in prop::collection::vec(deduction(), 0..8),
    ) {
        let (receivable, cash, entries) = build(applied, &deductions);

        match LoanService::balance(applied, receivable, cash, &entries) {
            Ok(balanced) => {
                let totals = balanced.totals;
                prop_assert_eq!(totals.total_debit, totals.total_credit);
                prop_assert_eq!(totals.net_proceeds, applied - totals.total_deductions);
                prop_assert_eq!(totals.principal, applied + totals.total_add_on);
                prop_assert!(totals.net_proceeds >= Decimal::ZERO);
            }
            Err(_) => {
                let deducted: Decimal = deductions
                    .iter()
                    .filter(|(_, add_on, _)| !add_on)
                    .map(|(_, _, value)| *value)
                    .sum();
                prop_assert!(deducted > applied);
            }
        }
    }

    /// Soft-deleting then restoring any automatic deduction reproduces the totals.
    #[test]
    fn test_soft_delete_restore_round_trip(
        deductions in prop::collection::vec(deduction(), 1..8),
        pick in any::<prop::sample::Index>(),
    ) {
        let applied = Decimal::new(100_000_000, 2);
        let (receivable, cash, mut entries) = build(applied, &deductions);
        let before = LoanService::balance(applied, receivable, cash, &entries).unwrap().totals;

        let automatic: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.entry_type == LoanEntryType::AutomaticDeduction)
            .map(|(i, _)| i)
            .collect();
        prop_assume!(!automatic.is_empty());
        let target = automatic[pick.index(automatic.len())];

        entries[target].is_automatic_deduction_deleted = true;
        LoanService::balance(applied, receivable, cash, &entries).unwrap();
        entries[target].is_automatic_deduction_deleted = false;
        let after = LoanService::balance(applied, receivable, cash, &entries).unwrap().totals;

        prop_assert_eq!(before, after);
    }
}
