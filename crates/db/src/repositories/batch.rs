//! Transaction batch reconciler.
//!
//! A teller's open batch collects cash count and disbursement lines. Every line
//! mutation refolds the batch totals from the live lines inside the same
//! transaction, under the batch's advisory lock.

use chrono::Utc;
use coopbooks_core::batch::{
    BatchError, BatchService, BatchTotals, CashCountInput, CashCountLine, DisbursementInput,
    DisbursementLine, OpenBatchInput, TransactionBatch,
};
use coopbooks_core::ledger::{Actor, EntrySource, PostingRequest};
use coopbooks_core::{EngineError, Operation};
use coopbooks_shared::config::EngineConfig;
use coopbooks_shared::types::{
    AccountId, CashCountId, Currency, DisbursementTransactionId, LedgerEntryId,
    TransactionBatchId,
};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbErr, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::ledger::LedgerPoster;
use super::transaction::{OpenTransactionInput, TransactionRepository};
use crate::entities::{cash_counts, disbursement_transactions, transaction_batches};
use crate::error::{Failure, is_unique_violation};
use crate::locks::{self, LockKey};

/// A line mutation together with the batch totals it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchUpdate<T> {
    /// The line written.
    pub line: T,
    /// Batch totals after recomputation.
    pub totals: BatchTotals,
}

fn to_batch(model: transaction_batches::Model) -> Result<TransactionBatch, DbErr> {
    let currency: Currency = model.currency.parse().map_err(DbErr::Type)?;
    Ok(TransactionBatch {
        id: model.id.into(),
        organization_id: model.organization_id.into(),
        branch_id: model.branch_id.into(),
        employee_user_id: model.employee_user_id.into(),
        currency,
        deposit_in_bank: model.deposit_in_bank,
        cash_count_total: model.cash_count_total,
        grand_total: model.grand_total,
        total_disbursement: model.total_disbursement,
        is_closed: model.is_closed,
        started_at: model.started_at.with_timezone(&Utc),
        ended_at: model.ended_at.map(|t| t.with_timezone(&Utc)),
    })
}

impl From<cash_counts::Model> for CashCountLine {
    fn from(model: cash_counts::Model) -> Self {
        Self {
            id: model.id.into(),
            transaction_batch_id: model.transaction_batch_id.into(),
            bill_amount: model.bill_amount,
            quantity: model.quantity,
            amount: model.amount,
            name: model.name,
        }
    }
}

impl From<disbursement_transactions::Model> for DisbursementLine {
    fn from(model: disbursement_transactions::Model) -> Self {
        Self {
            id: model.id.into(),
            transaction_batch_id: model.transaction_batch_id.into(),
            amount: model.amount,
            description: model.description,
            reference_number: model.reference_number,
            account_id: model.account_id.map(Into::into),
            ledger_entry_id: model.ledger_entry_id.map(Into::into),
        }
    }
}

/// Query for the actor's open batch.
fn open_batch_of(actor: &Actor) -> sea_orm::Select<transaction_batches::Entity> {
    transaction_batches::Entity::find()
        .filter(transaction_batches::Column::EmployeeUserId.eq(actor.user_id.into_inner()))
        .filter(transaction_batches::Column::OrganizationId.eq(actor.organization_id.into_inner()))
        .filter(transaction_batches::Column::BranchId.eq(actor.branch_id.into_inner()))
        .filter(transaction_batches::Column::IsClosed.eq(false))
}

/// Owns teller batches and keeps their totals in step with their lines.
#[derive(Debug, Clone, Default)]
pub struct BatchReconciler {
    engine: EngineConfig,
    poster: LedgerPoster,
}

impl BatchReconciler {
    /// Creates a new reconciler.
    #[must_use]
    pub fn new(engine: EngineConfig) -> Self {
        Self {
            poster: LedgerPoster::new(engine.clone()),
            engine,
        }
    }

    // ========== Batch lifecycle ==========

    /// Opens a batch for the actor.
    ///
    /// # Errors
    ///
    /// Returns `BatchAlreadyOpen` if the actor still has an open batch in this
    /// organization and branch, or a deposit validation error.
    #[instrument(skip_all, fields(user_id = %actor.user_id))]
    pub async fn open_batch<C>(
        &self,
        conn: &C,
        actor: &Actor,
        input: OpenBatchInput,
    ) -> Result<TransactionBatch, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.try_open_batch(conn, actor, input)
            .await
            .map_err(|f| f.into_engine(Operation::OpenBatch))
    }

    async fn try_open_batch<C>(
        &self,
        conn: &C,
        actor: &Actor,
        input: OpenBatchInput,
    ) -> Result<TransactionBatch, Failure>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        BatchService::validate_deposit(input.deposit_in_bank, input.currency)?;

        let txn = locks::begin(conn, &self.engine).await?;
        locks::acquire(
            &txn,
            &self.engine,
            LockKey::ActorBatch {
                user_id: actor.user_id,
                organization_id: actor.organization_id,
                branch_id: actor.branch_id,
            },
        )
        .await?;

        if let Some(existing) = open_batch_of(actor).one(&txn).await? {
            return Err(BatchError::BatchAlreadyOpen(existing.id.into()).into());
        }

        let now = Utc::now();
        let inserted = transaction_batches::ActiveModel {
            id: Set(TransactionBatchId::new().into_inner()),
            organization_id: Set(actor.organization_id.into_inner()),
            branch_id: Set(actor.branch_id.into_inner()),
            employee_user_id: Set(actor.user_id.into_inner()),
            currency: Set(input.currency.code().to_string()),
            deposit_in_bank: Set(input.deposit_in_bank),
            cash_count_total: Set(Decimal::ZERO),
            grand_total: Set(input.deposit_in_bank),
            total_disbursement: Set(Decimal::ZERO),
            is_closed: Set(false),
            started_at: Set(now.into()),
            ended_at: Set(None),
            updated_at: Set(now.into()),
        }
        .insert(&txn)
        .await;

        let model = match inserted {
            Ok(model) => model,
            Err(err) if is_unique_violation(&err) => {
                // Lost the race with serialization disabled.
                txn.rollback().await?;
                let existing = open_batch_of(actor).one(conn).await?;
                return Err(match existing {
                    Some(batch) => Failure::from(BatchError::BatchAlreadyOpen(batch.id.into())),
                    None => Failure::from(err),
                });
            }
            Err(err) => return Err(err.into()),
        };
        txn.commit().await?;

        info!(batch_id = %model.id, currency = %model.currency, "Transaction batch opened");
        Ok(to_batch(model)?)
    }

    /// Returns the actor's open batch, if any.
    ///
    /// # Errors
    ///
    /// Returns a transient error if the database fails.
    pub async fn current_batch<C>(
        &self,
        conn: &C,
        actor: &Actor,
    ) -> Result<Option<TransactionBatch>, EngineError>
    where
        C: ConnectionTrait,
    {
        async {
            let model = open_batch_of(actor).one(conn).await?;
            Ok::<_, Failure>(model.map(to_batch).transpose()?)
        }
        .await
        .map_err(|f| f.into_engine(Operation::OpenBatch))
    }

    /// Finds a batch in the actor's scope.
    ///
    /// # Errors
    ///
    /// Returns `BatchNotFound`, `CrossTenantReference`, or a transient error.
    pub async fn find_batch<C>(
        &self,
        conn: &C,
        actor: &Actor,
        batch_id: TransactionBatchId,
    ) -> Result<TransactionBatch, EngineError>
    where
        C: ConnectionTrait,
    {
        Self::scoped_batch(conn, actor, batch_id)
            .await
            .map_err(|f| f.into_engine(Operation::Recompute))
    }

    /// Runs a final recomputation and closes the actor's open batch.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveBatch` when the actor has no open batch.
    #[instrument(skip_all, fields(user_id = %actor.user_id))]
    pub async fn end_batch<C>(
        &self,
        conn: &C,
        actor: &Actor,
    ) -> Result<TransactionBatch, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.try_end_batch(conn, actor)
            .await
            .map_err(|f| f.into_engine(Operation::EndBatch))
    }

    async fn try_end_batch<C>(&self, conn: &C, actor: &Actor) -> Result<TransactionBatch, Failure>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let txn = locks::begin(conn, &self.engine).await?;
        let batch = self.active_batch(&txn, actor).await?;
        let totals = self.recompute_in(&txn, batch.id, None).await?;

        let now = Utc::now();
        let mut model = transaction_batches::Entity::find_by_id(batch.id.into_inner())
            .one(&txn)
            .await?
            .ok_or(BatchError::BatchNotFound(batch.id))?
            .into_active_model();
        model.is_closed = Set(true);
        model.ended_at = Set(Some(now.into()));
        model.updated_at = Set(now.into());
        let model = model.update(&txn).await?;
        txn.commit().await?;

        info!(
            batch_id = %batch.id,
            grand_total = %totals.grand_total,
            total_disbursement = %totals.total_disbursement,
            "Transaction batch ended"
        );
        Ok(to_batch(model)?)
    }

    /// Declares the deposit-in-bank amount of the actor's open batch.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveBatch`, `NegativeDeposit`, or `ExcessPrecision`.
    #[instrument(skip_all, fields(user_id = %actor.user_id, %deposit_in_bank))]
    pub async fn set_deposit_in_bank<C>(
        &self,
        conn: &C,
        actor: &Actor,
        deposit_in_bank: Decimal,
    ) -> Result<BatchTotals, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        async {
            let txn = locks::begin(conn, &self.engine).await?;
            let batch = self.active_batch(&txn, actor).await?;
            let totals = self
                .recompute_in(&txn, batch.id, Some(deposit_in_bank))
                .await?;
            txn.commit().await?;
            Ok::<_, Failure>(totals)
        }
        .await
        .map_err(|f| f.into_engine(Operation::SetDeposit))
    }

    // ========== Cash counts ==========

    /// Adds a cash count line to the actor's open batch.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveBatch` or a line validation error.
    #[instrument(skip_all, fields(user_id = %actor.user_id, bill_amount = %input.bill_amount, quantity = input.quantity))]
    pub async fn add_cash_count<C>(
        &self,
        conn: &C,
        actor: &Actor,
        input: CashCountInput,
    ) -> Result<BatchUpdate<CashCountLine>, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        async {
            let txn = locks::begin(conn, &self.engine).await?;
            let batch = self.active_batch(&txn, actor).await?;
            let line = Self::insert_cash_count(&txn, actor, &batch, input).await?;
            let totals = self.recompute_in(&txn, batch.id, None).await?;
            txn.commit().await?;
            Ok::<_, Failure>(BatchUpdate { line, totals })
        }
        .await
        .map_err(|f| f.into_engine(Operation::CashCount))
    }

    /// Rewrites a cash count line of the actor's open batch.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveBatch`, `CashCountNotFound`, or a line validation error.
    #[instrument(skip_all, fields(user_id = %actor.user_id, %cash_count_id))]
    pub async fn update_cash_count<C>(
        &self,
        conn: &C,
        actor: &Actor,
        cash_count_id: CashCountId,
        input: CashCountInput,
    ) -> Result<BatchUpdate<CashCountLine>, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        async {
            let txn = locks::begin(conn, &self.engine).await?;
            let batch = self.active_batch(&txn, actor).await?;
            let amount = BatchService::validate_cash_count(&input, batch.currency)?;

            let mut model = Self::live_cash_count(&txn, batch.id, cash_count_id)
                .await?
                .into_active_model();
            model.bill_amount = Set(input.bill_amount);
            model.quantity = Set(input.quantity);
            model.amount = Set(amount);
            model.name = Set(input.name);
            model.updated_at = Set(Utc::now().into());
            let line = model.update(&txn).await?.into();

            let totals = self.recompute_in(&txn, batch.id, None).await?;
            txn.commit().await?;
            Ok::<_, Failure>(BatchUpdate { line, totals })
        }
        .await
        .map_err(|f| f.into_engine(Operation::CashCount))
    }

    /// Removes a cash count line from the actor's open batch.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveBatch` or `CashCountNotFound`.
    #[instrument(skip_all, fields(user_id = %actor.user_id, %cash_count_id))]
    pub async fn delete_cash_count<C>(
        &self,
        conn: &C,
        actor: &Actor,
        cash_count_id: CashCountId,
    ) -> Result<BatchTotals, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        async {
            let txn = locks::begin(conn, &self.engine).await?;
            let batch = self.active_batch(&txn, actor).await?;

            let now = Utc::now();
            let mut model = Self::live_cash_count(&txn, batch.id, cash_count_id)
                .await?
                .into_active_model();
            model.deleted_at = Set(Some(now.into()));
            model.updated_at = Set(now.into());
            model.update(&txn).await?;

            let totals = self.recompute_in(&txn, batch.id, None).await?;
            txn.commit().await?;
            Ok::<_, Failure>(totals)
        }
        .await
        .map_err(|f| f.into_engine(Operation::CashCount))
    }

    /// Replaces every cash count line of the actor's open batch.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveBatch` or the first line validation error. No line is
    /// replaced when any input is invalid.
    #[instrument(skip_all, fields(user_id = %actor.user_id, count = inputs.len()))]
    pub async fn replace_cash_counts<C>(
        &self,
        conn: &C,
        actor: &Actor,
        inputs: Vec<CashCountInput>,
    ) -> Result<BatchUpdate<Vec<CashCountLine>>, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        async {
            let txn = locks::begin(conn, &self.engine).await?;
            let batch = self.active_batch(&txn, actor).await?;

            let now = Utc::now();
            cash_counts::Entity::update_many()
                .col_expr(cash_counts::Column::DeletedAt, Expr::value(now))
                .col_expr(cash_counts::Column::UpdatedAt, Expr::value(now))
                .filter(cash_counts::Column::TransactionBatchId.eq(batch.id.into_inner()))
                .filter(cash_counts::Column::DeletedAt.is_null())
                .exec(&txn)
                .await?;

            let mut lines = Vec::with_capacity(inputs.len());
            for input in inputs {
                lines.push(Self::insert_cash_count(&txn, actor, &batch, input).await?);
            }

            let totals = self.recompute_in(&txn, batch.id, None).await?;
            txn.commit().await?;
            Ok::<_, Failure>(BatchUpdate {
                line: lines,
                totals,
            })
        }
        .await
        .map_err(|f| f.into_engine(Operation::CashCount))
    }

    /// Live cash count lines of a batch in the actor's scope.
    ///
    /// # Errors
    ///
    /// Returns `BatchNotFound`, `CrossTenantReference`, or a transient error.
    pub async fn cash_counts<C>(
        &self,
        conn: &C,
        actor: &Actor,
        batch_id: TransactionBatchId,
    ) -> Result<Vec<CashCountLine>, EngineError>
    where
        C: ConnectionTrait,
    {
        async {
            Self::scoped_batch(conn, actor, batch_id).await?;
            let models = cash_counts::Entity::find()
                .filter(cash_counts::Column::TransactionBatchId.eq(batch_id.into_inner()))
                .filter(cash_counts::Column::DeletedAt.is_null())
                .order_by_desc(cash_counts::Column::BillAmount)
                .all(conn)
                .await?;
            Ok::<_, Failure>(models.into_iter().map(Into::into).collect())
        }
        .await
        .map_err(|f| f.into_engine(Operation::CashCount))
    }

    // ========== Disbursements ==========

    /// Adds a disbursement to the actor's open batch.
    ///
    /// When the input names an account, the payout is also booked as a
    /// disbursement debit under a new teller transaction.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveBatch`, a line validation error, or any posting error.
    #[instrument(skip_all, fields(user_id = %actor.user_id, amount = %input.amount))]
    pub async fn add_disbursement<C>(
        &self,
        conn: &C,
        actor: &Actor,
        input: DisbursementInput,
    ) -> Result<BatchUpdate<DisbursementLine>, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.try_add_disbursement(conn, actor, input)
            .await
            .map_err(|f| f.into_engine(Operation::Disbursement))
    }

    async fn try_add_disbursement<C>(
        &self,
        conn: &C,
        actor: &Actor,
        input: DisbursementInput,
    ) -> Result<BatchUpdate<DisbursementLine>, Failure>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let txn = locks::begin(conn, &self.engine).await?;
        let batch = self.active_batch(&txn, actor).await?;
        BatchService::validate_disbursement(&input, batch.currency)?;

        let ledger_entry_id = match input.account_id {
            Some(account_id) => Some(self.book_disbursement(&txn, actor, account_id, &input).await?),
            None => None,
        };

        let now = Utc::now();
        let model = disbursement_transactions::ActiveModel {
            id: Set(DisbursementTransactionId::new().into_inner()),
            transaction_batch_id: Set(batch.id.into_inner()),
            organization_id: Set(actor.organization_id.into_inner()),
            branch_id: Set(actor.branch_id.into_inner()),
            account_id: Set(input.account_id.map(AccountId::into_inner)),
            ledger_entry_id: Set(ledger_entry_id.map(LedgerEntryId::into_inner)),
            amount: Set(input.amount),
            description: Set(input.description),
            reference_number: Set(input.reference_number),
            created_by: Set(actor.user_id.into_inner()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            deleted_at: Set(None),
        }
        .insert(&txn)
        .await?;

        let totals = self.recompute_in(&txn, batch.id, None).await?;
        txn.commit().await?;
        Ok(BatchUpdate {
            line: model.into(),
            totals,
        })
    }

    /// Edits a disbursement of the actor's open batch.
    ///
    /// A booked payout whose amount or account changes is reversed and booked
    /// again.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveBatch`, `DisbursementNotFound`, a line validation
    /// error, or any posting error.
    #[instrument(skip_all, fields(user_id = %actor.user_id, %disbursement_id))]
    pub async fn update_disbursement<C>(
        &self,
        conn: &C,
        actor: &Actor,
        disbursement_id: DisbursementTransactionId,
        input: DisbursementInput,
    ) -> Result<BatchUpdate<DisbursementLine>, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.try_update_disbursement(conn, actor, disbursement_id, input)
            .await
            .map_err(|f| f.into_engine(Operation::Disbursement))
    }

    async fn try_update_disbursement<C>(
        &self,
        conn: &C,
        actor: &Actor,
        disbursement_id: DisbursementTransactionId,
        input: DisbursementInput,
    ) -> Result<BatchUpdate<DisbursementLine>, Failure>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let txn = locks::begin(conn, &self.engine).await?;
        let batch = self.active_batch(&txn, actor).await?;
        BatchService::validate_disbursement(&input, batch.currency)?;

        let existing = Self::live_disbursement(&txn, batch.id, disbursement_id).await?;
        let rebook = existing.amount != input.amount
            || existing.account_id != input.account_id.map(AccountId::into_inner);

        let mut ledger_entry_id = existing.ledger_entry_id.map(LedgerEntryId::from);
        if rebook {
            if let Some(entry_id) = ledger_entry_id.take() {
                self.poster
                    .reverse_in(&txn, actor, entry_id, Some("Disbursement edited"))
                    .await?;
            }
            if let Some(account_id) = input.account_id {
                ledger_entry_id =
                    Some(self.book_disbursement(&txn, actor, account_id, &input).await?);
            }
        }

        let mut model = existing.into_active_model();
        model.account_id = Set(input.account_id.map(AccountId::into_inner));
        model.ledger_entry_id = Set(ledger_entry_id.map(LedgerEntryId::into_inner));
        model.amount = Set(input.amount);
        model.description = Set(input.description);
        model.reference_number = Set(input.reference_number);
        model.updated_at = Set(Utc::now().into());
        let line = model.update(&txn).await?.into();

        let totals = self.recompute_in(&txn, batch.id, None).await?;
        txn.commit().await?;
        Ok(BatchUpdate { line, totals })
    }

    /// Removes a disbursement from the actor's open batch, reversing its
    /// booking if it has one.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveBatch`, `DisbursementNotFound`, or a reversal error.
    #[instrument(skip_all, fields(user_id = %actor.user_id, %disbursement_id))]
    pub async fn delete_disbursement<C>(
        &self,
        conn: &C,
        actor: &Actor,
        disbursement_id: DisbursementTransactionId,
    ) -> Result<BatchTotals, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        async {
            let txn = locks::begin(conn, &self.engine).await?;
            let batch = self.active_batch(&txn, actor).await?;
            let existing = Self::live_disbursement(&txn, batch.id, disbursement_id).await?;

            if let Some(entry_id) = existing.ledger_entry_id {
                self.poster
                    .reverse_in(&txn, actor, entry_id.into(), Some("Disbursement deleted"))
                    .await?;
            }

            let now = Utc::now();
            let mut model = existing.into_active_model();
            model.deleted_at = Set(Some(now.into()));
            model.updated_at = Set(now.into());
            model.update(&txn).await?;

            let totals = self.recompute_in(&txn, batch.id, None).await?;
            txn.commit().await?;
            Ok::<_, Failure>(totals)
        }
        .await
        .map_err(|f| f.into_engine(Operation::Disbursement))
    }

    /// Live disbursement lines of a batch in the actor's scope.
    ///
    /// # Errors
    ///
    /// Returns `BatchNotFound`, `CrossTenantReference`, or a transient error.
    pub async fn disbursements<C>(
        &self,
        conn: &C,
        actor: &Actor,
        batch_id: TransactionBatchId,
    ) -> Result<Vec<DisbursementLine>, EngineError>
    where
        C: ConnectionTrait,
    {
        async {
            Self::scoped_batch(conn, actor, batch_id).await?;
            let models = disbursement_transactions::Entity::find()
                .filter(
                    disbursement_transactions::Column::TransactionBatchId.eq(batch_id.into_inner()),
                )
                .filter(disbursement_transactions::Column::DeletedAt.is_null())
                .order_by_asc(disbursement_transactions::Column::CreatedAt)
                .all(conn)
                .await?;
            Ok::<_, Failure>(models.into_iter().map(Into::into).collect())
        }
        .await
        .map_err(|f| f.into_engine(Operation::Disbursement))
    }

    // ========== Recomputation ==========

    /// Refolds a batch's totals from its live lines and persists them.
    ///
    /// `deposit_override` replaces and persists the declared deposit; it is
    /// rejected on a closed batch. Running this twice with no line change
    /// writes the same totals.
    ///
    /// # Errors
    ///
    /// Returns `BatchNotFound`, `CrossTenantReference`, `BatchClosed` for an
    /// override on a closed batch, a deposit validation error, or a
    /// transient error.
    #[instrument(skip_all, fields(user_id = %actor.user_id, %batch_id))]
    pub async fn recompute<C>(
        &self,
        conn: &C,
        actor: &Actor,
        batch_id: TransactionBatchId,
        deposit_override: Option<Decimal>,
    ) -> Result<BatchTotals, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        async {
            let txn = locks::begin(conn, &self.engine).await?;
            Self::scoped_batch(&txn, actor, batch_id).await?;
            let totals = self.recompute_in(&txn, batch_id, deposit_override).await?;
            txn.commit().await?;
            Ok::<_, Failure>(totals)
        }
        .await
        .map_err(|f| f.into_engine(Operation::Recompute))
    }

    pub(crate) async fn recompute_in(
        &self,
        txn: &DatabaseTransaction,
        batch_id: TransactionBatchId,
        deposit_override: Option<Decimal>,
    ) -> Result<BatchTotals, Failure> {
        locks::acquire(txn, &self.engine, LockKey::Batch(batch_id)).await?;
        let batch = Self::load_batch(txn, batch_id).await?;

        let deposit_in_bank = match deposit_override {
            Some(deposit) => {
                BatchService::ensure_open(&batch)?;
                BatchService::validate_deposit(deposit, batch.currency)?;
                deposit
            }
            None => batch.deposit_in_bank,
        };

        let cash_amounts: Vec<Decimal> = cash_counts::Entity::find()
            .filter(cash_counts::Column::TransactionBatchId.eq(batch_id.into_inner()))
            .filter(cash_counts::Column::DeletedAt.is_null())
            .select_only()
            .column(cash_counts::Column::Amount)
            .into_tuple()
            .all(txn)
            .await?;
        let disbursement_amounts: Vec<Decimal> = disbursement_transactions::Entity::find()
            .filter(disbursement_transactions::Column::TransactionBatchId.eq(batch_id.into_inner()))
            .filter(disbursement_transactions::Column::DeletedAt.is_null())
            .select_only()
            .column(disbursement_transactions::Column::Amount)
            .into_tuple()
            .all(txn)
            .await?;

        let totals =
            BatchService::compute_totals(cash_amounts, disbursement_amounts, deposit_in_bank);
        BatchService::ensure_storable(&totals)?;

        transaction_batches::Entity::update_many()
            .col_expr(
                transaction_batches::Column::CashCountTotal,
                Expr::value(totals.cash_count_total),
            )
            .col_expr(
                transaction_batches::Column::DepositInBank,
                Expr::value(totals.deposit_in_bank),
            )
            .col_expr(
                transaction_batches::Column::GrandTotal,
                Expr::value(totals.grand_total),
            )
            .col_expr(
                transaction_batches::Column::TotalDisbursement,
                Expr::value(totals.total_disbursement),
            )
            .col_expr(transaction_batches::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(transaction_batches::Column::Id.eq(batch_id.into_inner()))
            .exec(txn)
            .await?;

        if totals != batch.totals() {
            info!(
                %batch_id,
                cash_count_total = %totals.cash_count_total,
                deposit_in_bank = %totals.deposit_in_bank,
                grand_total = %totals.grand_total,
                total_disbursement = %totals.total_disbursement,
                "Batch totals recomputed"
            );
        }
        Ok(totals)
    }

    // ========== Helpers ==========

    /// The actor's open batch, locked for this transaction.
    async fn active_batch(
        &self,
        txn: &DatabaseTransaction,
        actor: &Actor,
    ) -> Result<TransactionBatch, Failure> {
        let Some(candidate) = open_batch_of(actor).one(txn).await? else {
            warn!(user_id = %actor.user_id, "No active transaction batch");
            return Err(BatchError::NoActiveBatch {
                user_id: actor.user_id,
            }
            .into());
        };
        let batch_id = TransactionBatchId::from(candidate.id);
        locks::acquire(txn, &self.engine, LockKey::Batch(batch_id)).await?;

        // The batch may have been ended while we waited for the lock.
        let batch = Self::load_batch(txn, batch_id).await?;
        if batch.is_closed {
            return Err(BatchError::NoActiveBatch {
                user_id: actor.user_id,
            }
            .into());
        }
        Ok(batch)
    }

    async fn load_batch<C>(conn: &C, batch_id: TransactionBatchId) -> Result<TransactionBatch, Failure>
    where
        C: ConnectionTrait,
    {
        let model = transaction_batches::Entity::find_by_id(batch_id.into_inner())
            .one(conn)
            .await?
            .ok_or(BatchError::BatchNotFound(batch_id))?;
        Ok(to_batch(model)?)
    }

    async fn scoped_batch<C>(
        conn: &C,
        actor: &Actor,
        batch_id: TransactionBatchId,
    ) -> Result<TransactionBatch, Failure>
    where
        C: ConnectionTrait,
    {
        let batch = Self::load_batch(conn, batch_id).await?;
        BatchService::ensure_in_scope(actor, &batch)?;
        Ok(batch)
    }

    async fn insert_cash_count(
        txn: &DatabaseTransaction,
        actor: &Actor,
        batch: &TransactionBatch,
        input: CashCountInput,
    ) -> Result<CashCountLine, Failure> {
        let amount = BatchService::validate_cash_count(&input, batch.currency)?;
        let now = Utc::now();
        let model = cash_counts::ActiveModel {
            id: Set(CashCountId::new().into_inner()),
            transaction_batch_id: Set(batch.id.into_inner()),
            organization_id: Set(actor.organization_id.into_inner()),
            branch_id: Set(actor.branch_id.into_inner()),
            bill_amount: Set(input.bill_amount),
            quantity: Set(input.quantity),
            amount: Set(amount),
            name: Set(input.name),
            created_by: Set(actor.user_id.into_inner()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            deleted_at: Set(None),
        }
        .insert(txn)
        .await?;
        Ok(model.into())
    }

    async fn live_cash_count(
        txn: &DatabaseTransaction,
        batch_id: TransactionBatchId,
        cash_count_id: CashCountId,
    ) -> Result<cash_counts::Model, Failure> {
        cash_counts::Entity::find_by_id(cash_count_id.into_inner())
            .filter(cash_counts::Column::TransactionBatchId.eq(batch_id.into_inner()))
            .filter(cash_counts::Column::DeletedAt.is_null())
            .one(txn)
            .await?
            .ok_or_else(|| BatchError::CashCountNotFound(cash_count_id).into())
    }

    async fn live_disbursement(
        txn: &DatabaseTransaction,
        batch_id: TransactionBatchId,
        disbursement_id: DisbursementTransactionId,
    ) -> Result<disbursement_transactions::Model, Failure> {
        disbursement_transactions::Entity::find_by_id(disbursement_id.into_inner())
            .filter(disbursement_transactions::Column::TransactionBatchId.eq(batch_id.into_inner()))
            .filter(disbursement_transactions::Column::DeletedAt.is_null())
            .one(txn)
            .await?
            .ok_or_else(|| BatchError::DisbursementNotFound(disbursement_id).into())
    }

    /// Books a payout as a disbursement debit under its own teller transaction.
    async fn book_disbursement(
        &self,
        txn: &DatabaseTransaction,
        actor: &Actor,
        account_id: AccountId,
        input: &DisbursementInput,
    ) -> Result<LedgerEntryId, Failure> {
        let header = TransactionRepository::open_in(
            txn,
            actor,
            OpenTransactionInput {
                member_profile_id: None,
                description: input.description.clone(),
            },
        )
        .await?;

        let mut request = PostingRequest::debit(account_id, input.amount, EntrySource::Disbursement)
            .in_transaction(header.id);
        request.description.clone_from(&input.description);
        request.reference_number.clone_from(&input.reference_number);

        let entry = self.poster.post_in(txn, actor, request).await?;
        Ok(entry.id)
    }
}
