//! Loan entry balancer.
//!
//! A loan is kept balanced by two generated lines:
//! - the receivable line (`other`, debit) carries the principal,
//!   `applied_amount + Σadd-on deductions`
//! - the cash line (`other`, credit) carries whatever is left after every
//!   other line, which is the net proceeds released to the member
//!
//! Every mutation refolds the active lines from scratch; soft-deleted
//! automatic deductions are invisible to the fold.

use rust_decimal::Decimal;
use coopbooks_shared::types::{AccountId, Currency, fits_amount_column};

use super::error::LoanError;
use super::types::{
    BalancedLoan, DeductionInput, LineUpdate, LoanEntryType, LoanSetupInput, LoanTotals,
    LoanTransactionEntry, NewLoanEntry,
};
use crate::ledger::{BalanceSummary, aggregate};

/// Name of the generated receivable line.
pub const RECEIVABLE_LINE_NAME: &str = "Loans receivable";
/// Name of the generated cash line.
pub const CASH_LINE_NAME: &str = "Cash release";

/// Stateless loan balancing logic.
pub struct LoanService;

impl LoanService {
    /// Validates a positive amount booked in `currency`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount`, `AmountOutOfRange`, or `ExcessPrecision`.
    pub fn validate_amount(amount: Decimal, currency: Currency) -> Result<(), LoanError> {
        if amount <= Decimal::ZERO {
            return Err(LoanError::InvalidAmount(amount));
        }
        if !fits_amount_column(amount) {
            return Err(LoanError::AmountOutOfRange(amount));
        }
        if !currency.fits_precision(amount) {
            return Err(LoanError::ExcessPrecision {
                amount,
                currency: currency.code(),
            });
        }
        Ok(())
    }

    /// Validates a deduction.
    ///
    /// # Errors
    ///
    /// Returns an amount validation error or `EmptyName`.
    pub fn validate_deduction(input: &DeductionInput, currency: Currency) -> Result<(), LoanError> {
        Self::validate_amount(input.amount, currency)?;
        if input.name.trim().is_empty() {
            return Err(LoanError::EmptyName);
        }
        Ok(())
    }

    /// Builds the credit line for a deduction.
    #[must_use]
    pub fn deduction_entry(input: &DeductionInput, entry_type: LoanEntryType) -> NewLoanEntry {
        NewLoanEntry {
            account_id: input.account_id,
            entry_type,
            name: input.name.trim().to_string(),
            description: input.description.clone(),
            debit: Decimal::ZERO,
            credit: input.amount,
            is_add_on: input.is_add_on,
        }
    }

    /// Builds the initial lines for a new loan.
    ///
    /// The cash line starts at zero; the first balance pass fills it in.
    ///
    /// # Errors
    ///
    /// Returns an amount validation error, `SameReceivableAndCashAccount`, or
    /// a deduction validation error.
    pub fn setup_entries(
        input: &LoanSetupInput,
        currency: Currency,
    ) -> Result<Vec<NewLoanEntry>, LoanError> {
        Self::validate_amount(input.applied_amount, currency)?;
        if input.receivable_account_id == input.cash_account_id {
            return Err(LoanError::SameReceivableAndCashAccount);
        }

        let mut entries = Vec::with_capacity(input.automatic_deductions.len() + 2);
        entries.push(NewLoanEntry {
            account_id: input.receivable_account_id,
            entry_type: LoanEntryType::Other,
            name: RECEIVABLE_LINE_NAME.to_string(),
            description: None,
            debit: input.applied_amount,
            credit: Decimal::ZERO,
            is_add_on: false,
        });
        entries.push(NewLoanEntry {
            account_id: input.cash_account_id,
            entry_type: LoanEntryType::Other,
            name: CASH_LINE_NAME.to_string(),
            description: None,
            debit: Decimal::ZERO,
            credit: Decimal::ZERO,
            is_add_on: false,
        });

        for deduction in &input.automatic_deductions {
            Self::validate_deduction(deduction, currency)?;
            entries.push(Self::deduction_entry(
                deduction,
                LoanEntryType::AutomaticDeduction,
            ));
        }

        Ok(entries)
    }

    fn is_receivable_line(entry: &LoanTransactionEntry, receivable: AccountId) -> bool {
        entry.entry_type == LoanEntryType::Other
            && entry.account_id == receivable
            && entry.credit.is_zero()
    }

    fn is_cash_line(entry: &LoanTransactionEntry, cash: AccountId) -> bool {
        entry.entry_type == LoanEntryType::Other
            && entry.account_id == cash
            && entry.debit.is_zero()
    }

    /// Returns true for the receivable and cash lines.
    #[must_use]
    pub fn is_generated_line(
        entry: &LoanTransactionEntry,
        receivable: AccountId,
        cash: AccountId,
    ) -> bool {
        Self::is_receivable_line(entry, receivable) || Self::is_cash_line(entry, cash)
    }

    /// Refolds the active lines into totals and the generated-line amounts.
    ///
    /// # Errors
    ///
    /// Returns `MissingGeneratedLine` if either generated line is absent,
    /// `DeductionsExceedPrincipal` if nothing would be left to release, or
    /// `AmountOutOfRange` if a total would not fit its column.
    pub fn balance(
        applied_amount: Decimal,
        receivable_account_id: AccountId,
        cash_account_id: AccountId,
        entries: &[LoanTransactionEntry],
    ) -> Result<BalancedLoan, LoanError> {
        let active: Vec<&LoanTransactionEntry> =
            entries.iter().filter(|e| e.is_active()).collect();

        let receivable = active
            .iter()
            .copied()
            .find(|e| Self::is_receivable_line(e, receivable_account_id))
            .ok_or(LoanError::MissingGeneratedLine("receivable"))?;
        let cash = active
            .iter()
            .copied()
            .find(|e| e.id != receivable.id && Self::is_cash_line(e, cash_account_id))
            .ok_or(LoanError::MissingGeneratedLine("cash"))?;

        let mut totals = LoanTotals::default();
        for entry in active.iter().filter(|e| e.entry_type.is_deduction()) {
            if entry.is_add_on {
                totals.total_add_on += entry.credit;
            } else if entry.entry_type == LoanEntryType::AutomaticDeduction {
                totals.total_automatic_deductions += entry.credit;
            } else {
                totals.total_manual_deductions += entry.credit;
            }
        }
        totals.total_deductions = totals.total_automatic_deductions + totals.total_manual_deductions;
        totals.principal = applied_amount + totals.total_add_on;

        let others: BalanceSummary = aggregate(
            active
                .iter()
                .copied()
                .filter(|e| e.id != receivable.id && e.id != cash.id),
        );

        let plug = totals.principal + others.total_debit - others.total_credit;
        if plug < Decimal::ZERO {
            return Err(LoanError::DeductionsExceedPrincipal {
                deductions: others.total_credit - others.total_debit,
                principal: totals.principal,
            });
        }

        totals.net_proceeds = plug;
        totals.total_debit = totals.principal + others.total_debit;
        totals.total_credit = plug + others.total_credit;
        if let Some(total) = [totals.principal, totals.total_debit, totals.total_credit]
            .into_iter()
            .find(|total| !fits_amount_column(*total))
        {
            return Err(LoanError::AmountOutOfRange(total));
        }

        let mut updates = Vec::new();
        if receivable.debit != totals.principal {
            updates.push(LineUpdate {
                entry_id: receivable.id,
                debit: totals.principal,
                credit: Decimal::ZERO,
            });
        }
        if cash.credit != plug {
            updates.push(LineUpdate {
                entry_id: cash.id,
                debit: Decimal::ZERO,
                credit: plug,
            });
        }

        Ok(BalancedLoan { totals, updates })
    }

    /// Checks an entry can be soft-deleted.
    ///
    /// # Errors
    ///
    /// Returns `NotAutomaticDeduction` or `AlreadyDeleted`.
    pub fn ensure_soft_deletable(entry: &LoanTransactionEntry) -> Result<(), LoanError> {
        if entry.entry_type != LoanEntryType::AutomaticDeduction {
            return Err(LoanError::NotAutomaticDeduction(entry.id));
        }
        if entry.is_automatic_deduction_deleted {
            return Err(LoanError::AlreadyDeleted(entry.id));
        }
        Ok(())
    }

    /// Checks an entry can be restored.
    ///
    /// # Errors
    ///
    /// Returns `NotAutomaticDeduction` or `NotDeleted`.
    pub fn ensure_restorable(entry: &LoanTransactionEntry) -> Result<(), LoanError> {
        if entry.entry_type != LoanEntryType::AutomaticDeduction {
            return Err(LoanError::NotAutomaticDeduction(entry.id));
        }
        if !entry.is_automatic_deduction_deleted {
            return Err(LoanError::NotDeleted(entry.id));
        }
        Ok(())
    }

    /// Checks an entry can be hard-deleted.
    ///
    /// # Errors
    ///
    /// Returns `AutomaticDeductionRequiresSoftDelete` or `GeneratedLine`.
    pub fn ensure_hard_deletable(
        entry: &LoanTransactionEntry,
        receivable: AccountId,
        cash: AccountId,
    ) -> Result<(), LoanError> {
        match entry.entry_type {
            LoanEntryType::AutomaticDeduction => {
                Err(LoanError::AutomaticDeductionRequiresSoftDelete(entry.id))
            }
            LoanEntryType::Other if Self::is_generated_line(entry, receivable, cash) => {
                Err(LoanError::GeneratedLine(entry.id))
            }
            _ => Ok(()),
        }
    }

    /// Checks an entry can be edited as a deduction.
    ///
    /// # Errors
    ///
    /// Returns `NotADeduction` or `AlreadyDeleted`.
    pub fn ensure_editable(entry: &LoanTransactionEntry) -> Result<(), LoanError> {
        if !entry.entry_type.is_deduction() {
            return Err(LoanError::NotADeduction(entry.id));
        }
        if entry.is_automatic_deduction_deleted {
            return Err(LoanError::AlreadyDeleted(entry.id));
        }
        Ok(())
    }
}
