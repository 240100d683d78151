//! Balance aggregation over ledger entries.
//!
//! Balances are credit-positive: `balance = Σcredit − Σdebit`. A member's
//! savings deposit raises the balance, a withdrawal lowers it. Every reader in
//! the engine (member ledger, policy checks, reversal derivation) uses this one
//! orientation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::EntrySide;

/// Anything carrying a debit/credit pair.
pub trait DebitCredit {
    /// Debit amount.
    fn debit(&self) -> Decimal;
    /// Credit amount.
    fn credit(&self) -> Decimal;
}

impl DebitCredit for (Decimal, Decimal) {
    fn debit(&self) -> Decimal {
        self.0
    }

    fn credit(&self) -> Decimal {
        self.1
    }
}

impl<T: DebitCredit> DebitCredit for &T {
    fn debit(&self) -> Decimal {
        (*self).debit()
    }

    fn credit(&self) -> Decimal {
        (*self).credit()
    }
}

/// Folded totals of a set of entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSummary {
    /// Σcredit − Σdebit.
    pub balance: Decimal,
    /// Σdebit.
    pub total_debit: Decimal,
    /// Σcredit.
    pub total_credit: Decimal,
}

impl BalanceSummary {
    /// Summary with zero totals.
    pub const ZERO: Self = Self {
        balance: Decimal::ZERO,
        total_debit: Decimal::ZERO,
        total_credit: Decimal::ZERO,
    };

    /// Builds a summary from raw totals.
    #[must_use]
    pub fn from_totals(total_debit: Decimal, total_credit: Decimal) -> Self {
        Self {
            balance: total_credit - total_debit,
            total_debit,
            total_credit,
        }
    }

    /// Folds one entry into the summary.
    pub fn apply(&mut self, entry: &impl DebitCredit) {
        self.total_debit += entry.debit();
        self.total_credit += entry.credit();
        self.balance = self.total_credit - self.total_debit;
    }

    /// Returns the balance after a hypothetical posting.
    #[must_use]
    pub fn project(&self, side: EntrySide, amount: Decimal) -> Decimal {
        self.balance + signed_change(side, amount)
    }

    /// Returns true if debits equal credits.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.total_debit == self.total_credit
    }
}

/// Folds entries into `{balance, total_debit, total_credit}`.
///
/// Empty input yields zero totals.
#[must_use]
pub fn aggregate<I>(entries: I) -> BalanceSummary
where
    I: IntoIterator,
    I::Item: DebitCredit,
{
    entries
        .into_iter()
        .fold(BalanceSummary::ZERO, |mut summary, entry| {
            summary.apply(&entry);
            summary
        })
}

/// Balance effect of posting `amount` on `side`.
#[must_use]
pub fn signed_change(side: EntrySide, amount: Decimal) -> Decimal {
    match side {
        EntrySide::Credit => amount,
        EntrySide::Debit => -amount,
    }
}

/// The `(debit, credit)` pair that cancels the given pair.
#[must_use]
pub fn reversal_of(debit: Decimal, credit: Decimal) -> (Decimal, Decimal) {
    (credit, debit)
}

/// Plain sum, for declared amounts that are not debit/credit postings.
#[must_use]
pub fn sum_amounts<I>(amounts: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    amounts.into_iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_empty_input_is_zero() {
        let summary = aggregate(Vec::<(Decimal, Decimal)>::new());
        assert_eq!(summary, BalanceSummary::ZERO);
        assert!(summary.is_balanced());
    }

    #[test]
    fn test_deposit_is_credit_positive() {
        let summary = aggregate([(dec!(0), dec!(500.00))]);
        assert_eq!(summary.balance, dec!(500.00));
        assert_eq!(summary.total_credit, dec!(500.00));
        assert_eq!(summary.total_debit, dec!(0));
    }

    #[test]
    fn test_withdrawal_and_reversal_net_to_zero() {
        let withdrawal = (dec!(200.00), dec!(0));
        let reversal = reversal_of(withdrawal.0, withdrawal.1);
        assert_eq!(reversal, (dec!(0), dec!(200.00)));

        let summary = aggregate([withdrawal, reversal]);
        assert_eq!(summary.balance, dec!(0));
        assert!(summary.is_balanced());
    }

    #[test]
    fn test_mixed_entries() {
        let summary = aggregate([
            (dec!(0), dec!(1000.00)),
            (dec!(250.50), dec!(0)),
            (dec!(0), dec!(75.25)),
            (dec!(100.00), dec!(0)),
        ]);
        assert_eq!(summary.total_credit, dec!(1075.25));
        assert_eq!(summary.total_debit, dec!(350.50));
        assert_eq!(summary.balance, dec!(724.75));
    }

    #[test]
    fn test_project() {
        let summary = BalanceSummary::from_totals(dec!(100), dec!(300));
        assert_eq!(summary.balance, dec!(200));
        assert_eq!(summary.project(EntrySide::Debit, dec!(250)), dec!(-50));
        assert_eq!(summary.project(EntrySide::Credit, dec!(50)), dec!(250));
    }

    #[test]
    fn test_cent_accumulation_has_no_drift() {
        let summary = aggregate(std::iter::repeat_n((dec!(0), dec!(0.01)), 10_000));
        assert_eq!(summary.balance, dec!(100.00));
    }

    #[test]
    fn test_sum_amounts() {
        assert_eq!(sum_amounts([dec!(5000), dec!(1000)]), dec!(6000));
        assert_eq!(sum_amounts(std::iter::empty()), Decimal::ZERO);
    }
}
