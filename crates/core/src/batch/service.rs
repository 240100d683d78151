//! Batch service: cash count validation and totals computation.

use rust_decimal::Decimal;
use coopbooks_shared::types::{Currency, fits_amount_column};

use super::error::BatchError;
use super::types::{BatchTotals, CashCountInput, DisbursementInput, TransactionBatch};
use crate::ledger::{Actor, sum_amounts};

/// Stateless batch reconciliation logic.
pub struct BatchService;

impl BatchService {
    /// `bill_amount × quantity`.
    ///
    /// # Errors
    ///
    /// Returns `AmountOutOfRange` if the product overflows or does not fit
    /// the amount column.
    pub fn cash_count_amount(bill_amount: Decimal, quantity: i32) -> Result<Decimal, BatchError> {
        bill_amount
            .checked_mul(Decimal::from(quantity))
            .filter(|amount| fits_amount_column(*amount))
            .ok_or(BatchError::AmountOutOfRange(bill_amount))
    }

    /// Validates a cash count line and returns its amount.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBillAmount`, `NegativeQuantity`, `ExcessPrecision`, or
    /// `AmountOutOfRange`.
    pub fn validate_cash_count(
        input: &CashCountInput,
        currency: Currency,
    ) -> Result<Decimal, BatchError> {
        if input.bill_amount <= Decimal::ZERO {
            return Err(BatchError::InvalidBillAmount(input.bill_amount));
        }
        if input.quantity < 0 {
            return Err(BatchError::NegativeQuantity(input.quantity));
        }
        Self::ensure_precision(input.bill_amount, currency)?;
        Self::cash_count_amount(input.bill_amount, input.quantity)
    }

    /// Validates a disbursement line.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDisbursementAmount`, `AmountOutOfRange`, or
    /// `ExcessPrecision`.
    pub fn validate_disbursement(
        input: &DisbursementInput,
        currency: Currency,
    ) -> Result<(), BatchError> {
        if input.amount <= Decimal::ZERO {
            return Err(BatchError::InvalidDisbursementAmount(input.amount));
        }
        Self::ensure_precision(input.amount, currency)
    }

    /// Validates a deposit-in-bank declaration.
    ///
    /// # Errors
    ///
    /// Returns `NegativeDeposit`, `AmountOutOfRange`, or `ExcessPrecision`.
    pub fn validate_deposit(deposit: Decimal, currency: Currency) -> Result<(), BatchError> {
        if deposit < Decimal::ZERO {
            return Err(BatchError::NegativeDeposit(deposit));
        }
        Self::ensure_precision(deposit, currency)
    }

    fn ensure_precision(amount: Decimal, currency: Currency) -> Result<(), BatchError> {
        if !fits_amount_column(amount) {
            return Err(BatchError::AmountOutOfRange(amount));
        }
        if currency.fits_precision(amount) {
            Ok(())
        } else {
            Err(BatchError::ExcessPrecision {
                amount,
                currency: currency.code(),
            })
        }
    }

    /// Folds the current lines into batch totals.
    ///
    /// Lines are declarations, not postings, so they are summed directly.
    /// The result depends only on the inputs, never on prior stored totals.
    #[must_use]
    pub fn compute_totals<C, D>(
        cash_count_amounts: C,
        disbursement_amounts: D,
        deposit_in_bank: Decimal,
    ) -> BatchTotals
    where
        C: IntoIterator<Item = Decimal>,
        D: IntoIterator<Item = Decimal>,
    {
        let cash_count_total = sum_amounts(cash_count_amounts);
        BatchTotals {
            cash_count_total,
            deposit_in_bank,
            grand_total: cash_count_total + deposit_in_bank,
            total_disbursement: sum_amounts(disbursement_amounts),
        }
    }

    /// Rejects totals that would not fit the batch's amount columns.
    ///
    /// # Errors
    ///
    /// Returns `AmountOutOfRange` naming the first oversized total.
    pub fn ensure_storable(totals: &BatchTotals) -> Result<(), BatchError> {
        [
            totals.cash_count_total,
            totals.grand_total,
            totals.total_disbursement,
        ]
        .into_iter()
        .find(|total| !fits_amount_column(*total))
        .map_or(Ok(()), |total| Err(BatchError::AmountOutOfRange(total)))
    }

    /// Rejects a batch outside the actor's organization and branch.
    ///
    /// # Errors
    ///
    /// Returns `CrossTenantReference`.
    pub fn ensure_in_scope(actor: &Actor, batch: &TransactionBatch) -> Result<(), BatchError> {
        if actor.owns(batch.organization_id, batch.branch_id) {
            Ok(())
        } else {
            Err(BatchError::CrossTenantReference {
                entity: "transaction batch",
                id: batch.id.to_string(),
            })
        }
    }

    /// Rejects mutations on a closed batch.
    ///
    /// # Errors
    ///
    /// Returns `BatchClosed`.
    pub fn ensure_open(batch: &TransactionBatch) -> Result<(), BatchError> {
        if batch.is_closed {
            Err(BatchError::BatchClosed(batch.id))
        } else {
            Ok(())
        }
    }
}
