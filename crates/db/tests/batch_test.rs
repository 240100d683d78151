//! Teller batch reconciliation integration tests.
//!
//! Run with: `cargo test -p coopbooks-db --test batch_test`

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod common;

use coopbooks_core::ErrorKind;
use coopbooks_core::batch::{BatchError, CashCountInput, DisbursementInput, OpenBatchInput};
use coopbooks_core::ledger::LedgerError;
use coopbooks_db::{BatchReconciler, LedgerPoster, OpenTransactionInput, TransactionRepository};
use coopbooks_shared::types::Currency;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn php(deposit_in_bank: Decimal) -> OpenBatchInput {
    OpenBatchInput {
        currency: Currency::Php,
        deposit_in_bank,
    }
}

#[tokio::test]
async fn test_cash_counts_fold_into_grand_total() {
    let Some(db) = common::connect().await else {
        return;
    };
    let branch = common::seed_branch(&db).await;
    let reconciler = BatchReconciler::new(common::engine());

    let batch = reconciler
        .open_batch(&db, &branch.teller, php(Decimal::ZERO))
        .await
        .expect("batch should open");
    assert!(!batch.is_closed);
    assert_eq!(batch.grand_total, Decimal::ZERO);

    reconciler
        .add_cash_count(&db, &branch.teller, CashCountInput::new(dec!(1000), 5))
        .await
        .unwrap();
    let fives = reconciler
        .add_cash_count(&db, &branch.teller, CashCountInput::new(dec!(500), 2))
        .await
        .unwrap();
    assert_eq!(fives.line.amount, dec!(1000));

    let totals = reconciler
        .set_deposit_in_bank(&db, &branch.teller, dec!(1500))
        .await
        .unwrap();
    assert_eq!(totals.cash_count_total, dec!(6000));
    assert_eq!(totals.deposit_in_bank, dec!(1500));
    assert_eq!(totals.grand_total, dec!(7500));

    let totals = reconciler
        .delete_cash_count(&db, &branch.teller, fives.line.id)
        .await
        .unwrap();
    assert_eq!(totals.cash_count_total, dec!(5000));
    assert_eq!(totals.grand_total, dec!(6500));

    let stored = reconciler
        .find_batch(&db, &branch.teller, batch.id)
        .await
        .unwrap();
    assert_eq!(stored.totals(), totals);

    let lines = reconciler
        .cash_counts(&db, &branch.teller, batch.id)
        .await
        .unwrap();
    assert_eq!(lines.len(), 1);

    let err = reconciler
        .delete_cash_count(&db, &branch.teller, fives.line.id)
        .await
        .unwrap_err();
    assert!(matches!(err.as_batch(), Some(BatchError::CashCountNotFound(_))));
}

#[tokio::test]
async fn test_cash_count_edits_and_replacement() {
    let Some(db) = common::connect().await else {
        return;
    };
    let branch = common::seed_branch(&db).await;
    let reconciler = BatchReconciler::new(common::engine());
    reconciler
        .open_batch(&db, &branch.teller, php(Decimal::ZERO))
        .await
        .unwrap();

    let hundreds = reconciler
        .add_cash_count(&db, &branch.teller, CashCountInput::new(dec!(100), 3))
        .await
        .unwrap();
    let updated = reconciler
        .update_cash_count(
            &db,
            &branch.teller,
            hundreds.line.id,
            CashCountInput::new(dec!(100), 7),
        )
        .await
        .unwrap();
    assert_eq!(updated.line.amount, dec!(700));
    assert_eq!(updated.totals.cash_count_total, dec!(700));

    let err = reconciler
        .add_cash_count(&db, &branch.teller, CashCountInput::new(dec!(0), 1))
        .await
        .unwrap_err();
    assert!(matches!(err.as_batch(), Some(BatchError::InvalidBillAmount(_))));
    assert_eq!(err.kind(), ErrorKind::Validation);

    // One bad line keeps the old counts.
    let err = reconciler
        .replace_cash_counts(
            &db,
            &branch.teller,
            vec![
                CashCountInput::new(dec!(1000), 2),
                CashCountInput::new(dec!(20), -1),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err.as_batch(), Some(BatchError::NegativeQuantity(-1))));

    let replaced = reconciler
        .replace_cash_counts(
            &db,
            &branch.teller,
            vec![
                CashCountInput::new(dec!(1000), 2),
                CashCountInput::new(dec!(20), 10),
            ],
        )
        .await
        .unwrap();
    assert_eq!(replaced.line.len(), 2);
    assert_eq!(replaced.totals.cash_count_total, dec!(2200));
}

#[tokio::test]
async fn test_line_operations_need_open_batch() {
    let Some(db) = common::connect().await else {
        return;
    };
    let branch = common::seed_branch(&db).await;
    let reconciler = BatchReconciler::new(common::engine());

    let err = reconciler
        .add_cash_count(&db, &branch.teller, CashCountInput::new(dec!(1000), 1))
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_batch(),
        Some(BatchError::NoActiveBatch { user_id }) if *user_id == branch.teller.user_id
    ));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = reconciler
        .add_disbursement(&db, &branch.teller, DisbursementInput::new(dec!(50)))
        .await
        .unwrap_err();
    assert!(matches!(err.as_batch(), Some(BatchError::NoActiveBatch { .. })));

    // Another teller's open batch does not count.
    reconciler
        .open_batch(&db, &branch.another_teller(), php(Decimal::ZERO))
        .await
        .unwrap();
    let err = reconciler
        .set_deposit_in_bank(&db, &branch.teller, dec!(10))
        .await
        .unwrap_err();
    assert!(matches!(err.as_batch(), Some(BatchError::NoActiveBatch { .. })));
}

#[tokio::test]
async fn test_one_open_batch_per_teller() {
    let Some(db) = common::connect().await else {
        return;
    };
    let branch = common::seed_branch(&db).await;
    let reconciler = BatchReconciler::new(common::engine());

    let first = reconciler
        .open_batch(&db, &branch.teller, php(dec!(100)))
        .await
        .unwrap();
    assert_eq!(first.grand_total, dec!(100));

    let err = reconciler
        .open_batch(&db, &branch.teller, php(Decimal::ZERO))
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_batch(),
        Some(BatchError::BatchAlreadyOpen(id)) if *id == first.id
    ));

    let closed = reconciler.end_batch(&db, &branch.teller).await.unwrap();
    assert!(closed.is_closed);
    assert!(closed.ended_at.is_some());
    assert!(
        reconciler
            .current_batch(&db, &branch.teller)
            .await
            .unwrap()
            .is_none()
    );

    let err = reconciler.end_batch(&db, &branch.teller).await.unwrap_err();
    assert!(matches!(err.as_batch(), Some(BatchError::NoActiveBatch { .. })));

    let err = reconciler
        .recompute(&db, &branch.teller, first.id, Some(dec!(5)))
        .await
        .unwrap_err();
    assert!(matches!(err.as_batch(), Some(BatchError::BatchClosed(_))));

    let second = reconciler
        .open_batch(&db, &branch.teller, php(Decimal::ZERO))
        .await
        .unwrap();
    assert_ne!(second.id, first.id);
}

#[tokio::test]
async fn test_recompute_is_idempotent() {
    let Some(db) = common::connect().await else {
        return;
    };
    let branch = common::seed_branch(&db).await;
    let reconciler = BatchReconciler::new(common::engine());

    let batch = reconciler
        .open_batch(&db, &branch.teller, php(dec!(250)))
        .await
        .unwrap();
    reconciler
        .add_cash_count(&db, &branch.teller, CashCountInput::new(dec!(200), 4))
        .await
        .unwrap();
    reconciler
        .add_disbursement(
            &db,
            &branch.teller,
            DisbursementInput::new(dec!(120)).describe("Snacks"),
        )
        .await
        .unwrap();

    let first = reconciler
        .recompute(&db, &branch.teller, batch.id, None)
        .await
        .unwrap();
    let second = reconciler
        .recompute(&db, &branch.teller, batch.id, None)
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(first.cash_count_total, dec!(800));
    assert_eq!(first.grand_total, dec!(1050));
    assert_eq!(first.total_disbursement, dec!(120));

    let err = reconciler
        .recompute(&db, &branch.teller, batch.id, Some(dec!(-1)))
        .await
        .unwrap_err();
    assert!(matches!(err.as_batch(), Some(BatchError::NegativeDeposit(_))));

    let stored = reconciler
        .find_batch(&db, &branch.teller, batch.id)
        .await
        .unwrap();
    assert_eq!(stored.deposit_in_bank, dec!(250));
}

#[tokio::test]
async fn test_booked_disbursement_is_reversed_on_delete() {
    let Some(db) = common::connect().await else {
        return;
    };
    let branch = common::seed_branch(&db).await;
    let reconciler = BatchReconciler::new(common::engine());
    let poster = LedgerPoster::new(common::engine());

    let batch = reconciler
        .open_batch(&db, &branch.teller, php(Decimal::ZERO))
        .await
        .unwrap();
    let payout = reconciler
        .add_disbursement(
            &db,
            &branch.teller,
            DisbursementInput::new(dec!(300))
                .charged_to(branch.expense)
                .describe("Office supplies"),
        )
        .await
        .unwrap();
    assert_eq!(payout.totals.total_disbursement, dec!(300));
    let entry_id = payout.line.ledger_entry_id.expect("payout should be booked");

    let entry = poster.find_entry(&db, &branch.teller, entry_id).await.unwrap();
    assert_eq!(entry.debit, dec!(300));
    assert!(entry.transaction_id.is_some());

    let expense = poster
        .balance(&db, &branch.teller, branch.expense, None)
        .await
        .unwrap();
    assert_eq!(expense.balance, dec!(-300));

    let edited = reconciler
        .update_disbursement(
            &db,
            &branch.teller,
            payout.line.id,
            DisbursementInput::new(dec!(350)).charged_to(branch.expense),
        )
        .await
        .unwrap();
    assert_eq!(edited.totals.total_disbursement, dec!(350));
    assert_ne!(edited.line.ledger_entry_id, Some(entry_id));

    let expense = poster
        .balance(&db, &branch.teller, branch.expense, None)
        .await
        .unwrap();
    assert_eq!(expense.balance, dec!(-350));

    let err = poster
        .reverse(&db, &branch.teller, entry_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err.as_ledger(), Some(LedgerError::AlreadyReversed(_))));

    let totals = reconciler
        .delete_disbursement(&db, &branch.teller, payout.line.id)
        .await
        .unwrap();
    assert_eq!(totals.total_disbursement, Decimal::ZERO);
    assert!(
        reconciler
            .disbursements(&db, &branch.teller, batch.id)
            .await
            .unwrap()
            .is_empty()
    );

    let expense = poster
        .balance(&db, &branch.teller, branch.expense, None)
        .await
        .unwrap();
    assert_eq!(expense.balance, Decimal::ZERO);
    assert_eq!(expense.total_debit, dec!(650));
}

#[tokio::test]
async fn test_transactions_link_to_open_batch() {
    let Some(db) = common::connect().await else {
        return;
    };
    let branch = common::seed_branch(&db).await;
    let reconciler = BatchReconciler::new(common::engine());
    let transactions = TransactionRepository::new(common::engine());

    let batch = reconciler
        .open_batch(&db, &branch.teller, php(Decimal::ZERO))
        .await
        .unwrap();
    let header = transactions
        .open(&db, &branch.teller, OpenTransactionInput::default())
        .await
        .unwrap();
    assert_eq!(header.transaction_batch_id, Some(batch.id));

    let elsewhere = transactions
        .open(&db, &branch.another_teller(), OpenTransactionInput::default())
        .await
        .unwrap();
    assert!(elsewhere.transaction_batch_id.is_none());
}

#[tokio::test]
async fn test_other_branch_cannot_touch_batch() {
    let Some(db) = common::connect().await else {
        return;
    };
    let branch = common::seed_branch(&db).await;
    let other = common::seed_branch(&db).await;
    let reconciler = BatchReconciler::new(common::engine());

    let batch = reconciler
        .open_batch(&db, &branch.teller, php(dec!(400)))
        .await
        .unwrap();
    reconciler
        .add_cash_count(&db, &branch.teller, CashCountInput::new(dec!(100), 3))
        .await
        .unwrap();

    let err = reconciler
        .recompute(&db, &other.teller, batch.id, Some(dec!(999999)))
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_batch(),
        Some(BatchError::CrossTenantReference { entity: "transaction batch", .. })
    ));
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = reconciler
        .find_batch(&db, &other.teller, batch.id)
        .await
        .unwrap_err();
    assert!(matches!(err.as_batch(), Some(BatchError::CrossTenantReference { .. })));
    let err = reconciler
        .cash_counts(&db, &other.teller, batch.id)
        .await
        .unwrap_err();
    assert!(matches!(err.as_batch(), Some(BatchError::CrossTenantReference { .. })));
    let err = reconciler
        .disbursements(&db, &other.teller, batch.id)
        .await
        .unwrap_err();
    assert!(matches!(err.as_batch(), Some(BatchError::CrossTenantReference { .. })));

    let stored = reconciler
        .find_batch(&db, &branch.teller, batch.id)
        .await
        .unwrap();
    assert_eq!(stored.deposit_in_bank, dec!(400));
    assert_eq!(stored.grand_total, dec!(700));
}

#[tokio::test]
async fn test_oversized_cash_count_is_rejected() {
    let Some(db) = common::connect().await else {
        return;
    };
    let branch = common::seed_branch(&db).await;
    let reconciler = BatchReconciler::new(common::engine());

    let batch = reconciler
        .open_batch(&db, &branch.teller, php(Decimal::ZERO))
        .await
        .unwrap();

    let err = reconciler
        .add_cash_count(&db, &branch.teller, CashCountInput::new(Decimal::MAX, 2))
        .await
        .unwrap_err();
    assert!(matches!(err.as_batch(), Some(BatchError::AmountOutOfRange(_))));
    assert_eq!(err.kind(), ErrorKind::Validation);

    // Each line fits the column but their sum does not.
    reconciler
        .add_cash_count(
            &db,
            &branch.teller,
            CashCountInput::new(dec!(999999999999999), 1),
        )
        .await
        .unwrap();
    let err = reconciler
        .add_cash_count(
            &db,
            &branch.teller,
            CashCountInput::new(dec!(999999999999999), 1),
        )
        .await
        .unwrap_err();
    assert!(matches!(err.as_batch(), Some(BatchError::AmountOutOfRange(_))));

    let lines = reconciler
        .cash_counts(&db, &branch.teller, batch.id)
        .await
        .unwrap();
    assert_eq!(lines.len(), 1);
    let stored = reconciler
        .find_batch(&db, &branch.teller, batch.id)
        .await
        .unwrap();
    assert_eq!(stored.cash_count_total, dec!(999999999999999));
}
