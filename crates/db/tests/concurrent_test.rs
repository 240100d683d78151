//! Concurrent access tests for the posting engine.
//!
//! These tests verify that:
//! - Concurrent line edits on one batch never lose an update
//! - Concurrent withdrawals cannot overdraw a member's balance
//! - Print numbers, reversals, and batch opening stay unique under contention
//!
//! Run with: `cargo test -p coopbooks-db --test concurrent_test`

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::cast_possible_wrap)]

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use coopbooks_core::batch::{BatchError, CashCountInput, OpenBatchInput};
use coopbooks_core::ledger::{EntrySource, LedgerError, PostingRequest};
use coopbooks_db::{BatchReconciler, LedgerPoster};
use coopbooks_shared::types::Currency;
use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Barrier;

/// Stays below the test pool size so every task holds a connection at once.
const TASKS: usize = 16;

#[tokio::test]
async fn test_concurrent_cash_counts_sum_correctly() {
    let Some(db) = common::connect().await else {
        return;
    };
    let db = Arc::new(db);
    let branch = Arc::new(common::seed_branch(&db).await);
    let reconciler = Arc::new(BatchReconciler::new(common::engine()));

    let batch = reconciler
        .open_batch(
            db.as_ref(),
            &branch.teller,
            OpenBatchInput {
                currency: Currency::Php,
                deposit_in_bank: Decimal::ZERO,
            },
        )
        .await
        .unwrap();

    let barrier = Arc::new(Barrier::new(TASKS));
    let mut handles = Vec::with_capacity(TASKS);
    for _ in 0..TASKS {
        let db = Arc::clone(&db);
        let branch = Arc::clone(&branch);
        let reconciler = Arc::clone(&reconciler);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            reconciler
                .add_cash_count(db.as_ref(), &branch.teller, CashCountInput::new(dec!(100), 1))
                .await
        }));
    }

    for result in join_all(handles).await {
        result.expect("task panicked").expect("cash count failed");
    }

    let stored = reconciler
        .find_batch(db.as_ref(), &branch.teller, batch.id)
        .await
        .unwrap();
    assert_eq!(stored.cash_count_total, dec!(100) * Decimal::from(TASKS as i64));
    assert_eq!(stored.grand_total, stored.cash_count_total);

    let lines = reconciler
        .cash_counts(db.as_ref(), &branch.teller, batch.id)
        .await
        .unwrap();
    assert_eq!(lines.len(), TASKS);
}

#[tokio::test]
async fn test_concurrent_withdrawals_cannot_overdraw() {
    let Some(db) = common::connect().await else {
        return;
    };
    let db = Arc::new(db);
    let branch = Arc::new(common::seed_branch(&db).await);
    let poster = Arc::new(LedgerPoster::new(common::engine()));

    poster
        .post(
            db.as_ref(),
            &branch.teller,
            PostingRequest::credit(branch.savings, dec!(1000), EntrySource::Deposit)
                .for_member(branch.member),
        )
        .await
        .unwrap();

    let barrier = Arc::new(Barrier::new(TASKS));
    let mut handles = Vec::with_capacity(TASKS);
    for _ in 0..TASKS {
        let db = Arc::clone(&db);
        let branch = Arc::clone(&branch);
        let poster = Arc::clone(&poster);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            poster
                .post(
                    db.as_ref(),
                    &branch.teller,
                    PostingRequest::debit(branch.savings, dec!(100), EntrySource::Withdraw)
                        .for_member(branch.member),
                )
                .await
        }));
    }

    let mut succeeded = 0;
    let mut refused = 0;
    for result in join_all(handles).await {
        match result.expect("task panicked") {
            Ok(_) => succeeded += 1,
            Err(err) => {
                assert!(
                    matches!(
                        err.as_ledger(),
                        Some(LedgerError::NegativeBalanceNotAllowed { .. })
                    ),
                    "unexpected failure: {err}"
                );
                refused += 1;
            }
        }
    }
    assert_eq!(succeeded, 10);
    assert_eq!(refused, TASKS - 10);

    let summary = poster
        .balance(db.as_ref(), &branch.teller, branch.savings, Some(branch.member))
        .await
        .unwrap();
    assert_eq!(summary.balance, Decimal::ZERO);
}

#[tokio::test]
async fn test_concurrent_print_numbers_are_unique() {
    let Some(db) = common::connect().await else {
        return;
    };
    let db = Arc::new(db);
    let branch = Arc::new(common::seed_branch(&db).await);
    let poster = Arc::new(LedgerPoster::new(common::engine()));

    let requests = (0..TASKS)
        .map(|_| {
            PostingRequest::credit(branch.savings, dec!(1), EntrySource::Deposit)
                .for_member(branch.member)
        })
        .collect();
    let entries = poster
        .post_many(db.as_ref(), &branch.teller, requests)
        .await
        .unwrap();

    let barrier = Arc::new(Barrier::new(TASKS));
    let handles = entries.into_iter().map(|entry| {
        let db = Arc::clone(&db);
        let branch = Arc::clone(&branch);
        let poster = Arc::clone(&poster);
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            poster
                .assign_print_number(db.as_ref(), &branch.teller, entry.id)
                .await
        })
    });

    let numbers: HashSet<i64> = join_all(handles)
        .await
        .into_iter()
        .map(|result| result.expect("task panicked").expect("numbering failed"))
        .collect();
    let expected: HashSet<i64> = (1..=TASKS as i64).collect();
    assert_eq!(numbers, expected);
}

#[tokio::test]
async fn test_concurrent_reversals_post_once() {
    let Some(db) = common::connect().await else {
        return;
    };
    let db = Arc::new(db);
    let branch = Arc::new(common::seed_branch(&db).await);
    let poster = Arc::new(LedgerPoster::new(common::engine()));

    let entry = poster
        .post(
            db.as_ref(),
            &branch.teller,
            PostingRequest::credit(branch.savings, dec!(80), EntrySource::Deposit)
                .for_member(branch.member),
        )
        .await
        .unwrap();

    let barrier = Arc::new(Barrier::new(TASKS));
    let mut handles = Vec::with_capacity(TASKS);
    for _ in 0..TASKS {
        let db = Arc::clone(&db);
        let branch = Arc::clone(&branch);
        let poster = Arc::clone(&poster);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            poster.reverse(db.as_ref(), &branch.teller, entry.id, None).await
        }));
    }

    let mut reversed = 0;
    for result in join_all(handles).await {
        match result.expect("task panicked") {
            Ok(_) => reversed += 1,
            Err(err) => assert!(
                matches!(err.as_ledger(), Some(LedgerError::AlreadyReversed(_))),
                "unexpected failure: {err}"
            ),
        }
    }
    assert_eq!(reversed, 1);

    let summary = poster
        .balance(db.as_ref(), &branch.teller, branch.savings, Some(branch.member))
        .await
        .unwrap();
    assert_eq!(summary.balance, Decimal::ZERO);
}

#[tokio::test]
async fn test_concurrent_open_batch_opens_one() {
    let Some(db) = common::connect().await else {
        return;
    };
    let db = Arc::new(db);
    let branch = Arc::new(common::seed_branch(&db).await);
    let reconciler = Arc::new(BatchReconciler::new(common::engine()));

    let barrier = Arc::new(Barrier::new(TASKS));
    let mut handles = Vec::with_capacity(TASKS);
    for _ in 0..TASKS {
        let db = Arc::clone(&db);
        let branch = Arc::clone(&branch);
        let reconciler = Arc::clone(&reconciler);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            reconciler
                .open_batch(db.as_ref(), &branch.teller, OpenBatchInput::default())
                .await
        }));
    }

    let mut opened = 0;
    for result in join_all(handles).await {
        match result.expect("task panicked") {
            Ok(_) => opened += 1,
            Err(err) => assert!(
                matches!(err.as_batch(), Some(BatchError::BatchAlreadyOpen(_))),
                "unexpected failure: {err}"
            ),
        }
    }
    assert_eq!(opened, 1);
}
