//! Loan entry balancer.
//!
//! Each mutation of a loan's lines reruns the balancer in the same
//! transaction, under the loan's advisory lock. A mutation that leaves the
//! loan unbalanceable rolls back.

use std::fmt::Display;

use chrono::Utc;
use coopbooks_core::ledger::{Actor, LedgerError};
use coopbooks_core::loan::{
    DeductionInput, LoanEntryType, LoanError, LoanService, LoanSetupInput, LoanTotals,
    LoanTransaction, LoanTransactionEntry, NewLoanEntry,
};
use coopbooks_core::{EngineError, Operation};
use coopbooks_shared::config::EngineConfig;
use coopbooks_shared::types::{AccountId, Currency, LoanTransactionEntryId, LoanTransactionId};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbErr, EntityTrait,
    IntoActiveModel, ModelTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{accounts, loan_transaction_entries, loan_transactions, member_profiles};
use crate::error::Failure;
use crate::locks::{self, LockKey};

impl From<loan_transaction_entries::Model> for LoanTransactionEntry {
    fn from(model: loan_transaction_entries::Model) -> Self {
        Self {
            id: model.id.into(),
            loan_transaction_id: model.loan_transaction_id.into(),
            account_id: model.account_id.into(),
            entry_type: model.entry_type.into(),
            name: model.name,
            description: model.description,
            debit: model.debit,
            credit: model.credit,
            is_add_on: model.is_add_on,
            is_automatic_deduction_deleted: model.is_automatic_deduction_deleted,
        }
    }
}

impl From<loan_transactions::Model> for LoanTransaction {
    fn from(model: loan_transactions::Model) -> Self {
        Self {
            id: model.id.into(),
            organization_id: model.organization_id.into(),
            branch_id: model.branch_id.into(),
            member_profile_id: model.member_profile_id.into(),
            applied_amount: model.applied_amount,
            receivable_account_id: model.receivable_account_id.into(),
            cash_account_id: model.cash_account_id.into(),
            totals: LoanTotals {
                principal: model.principal,
                total_deductions: model.total_deductions,
                total_automatic_deductions: model.total_automatic_deductions,
                total_manual_deductions: model.total_manual_deductions,
                total_add_on: model.total_add_on,
                net_proceeds: model.net_proceeds,
                total_debit: model.total_debit,
                total_credit: model.total_credit,
            },
            created_by: model.created_by.into(),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

fn ensure_in_scope(
    actor: &Actor,
    entity: &'static str,
    id: impl Display,
    organization_id: Uuid,
    branch_id: Uuid,
) -> Result<(), LoanError> {
    if actor.owns(organization_id.into(), branch_id.into()) {
        Ok(())
    } else {
        Err(LoanError::CrossTenantReference {
            entity,
            id: id.to_string(),
        })
    }
}

/// Checks an account is in the actor's scope and returns its currency.
async fn check_account(
    txn: &DatabaseTransaction,
    actor: &Actor,
    account_id: AccountId,
) -> Result<Currency, Failure> {
    let account = accounts::Entity::find_by_id(account_id.into_inner())
        .one(txn)
        .await?
        .ok_or(LoanError::AccountNotFound(account_id))?;
    ensure_in_scope(
        actor,
        "account",
        account_id,
        account.organization_id,
        account.branch_id,
    )?;
    let currency: Currency = account.currency.parse().map_err(DbErr::Type)?;
    Ok(currency)
}

async fn scoped_loan<C>(
    conn: &C,
    actor: &Actor,
    loan_id: LoanTransactionId,
) -> Result<loan_transactions::Model, Failure>
where
    C: ConnectionTrait,
{
    let loan = loan_transactions::Entity::find_by_id(loan_id.into_inner())
        .one(conn)
        .await?
        .ok_or(LoanError::LoanNotFound(loan_id))?;
    ensure_in_scope(
        actor,
        "loan_transaction",
        loan_id,
        loan.organization_id,
        loan.branch_id,
    )?;
    Ok(loan)
}

async fn insert_entry(
    txn: &DatabaseTransaction,
    loan_id: LoanTransactionId,
    entry: NewLoanEntry,
) -> Result<loan_transaction_entries::Model, Failure> {
    let now = Utc::now();
    let model = loan_transaction_entries::ActiveModel {
        id: Set(LoanTransactionEntryId::new().into_inner()),
        loan_transaction_id: Set(loan_id.into_inner()),
        account_id: Set(entry.account_id.into_inner()),
        entry_type: Set(entry.entry_type.into()),
        name: Set(entry.name),
        description: Set(entry.description),
        debit: Set(entry.debit),
        credit: Set(entry.credit),
        is_add_on: Set(entry.is_add_on),
        is_automatic_deduction_deleted: Set(false),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(txn)
    .await?;
    Ok(model)
}

/// Keeps loan transactions balanced as their lines change.
#[derive(Debug, Clone, Default)]
pub struct LoanBalancer {
    engine: EngineConfig,
}

impl LoanBalancer {
    /// Creates a new balancer.
    #[must_use]
    pub const fn new(engine: EngineConfig) -> Self {
        Self { engine }
    }

    /// Sets up a loan's receivable, cash, and automatic deduction lines and
    /// balances it.
    ///
    /// # Errors
    ///
    /// Returns a setup validation error, a missing or cross-tenant reference,
    /// or `DeductionsExceedPrincipal`.
    #[instrument(skip_all, fields(
        user_id = %actor.user_id,
        member_profile_id = %input.member_profile_id,
        applied_amount = %input.applied_amount
    ))]
    pub async fn create_loan<C>(
        &self,
        conn: &C,
        actor: &Actor,
        input: LoanSetupInput,
    ) -> Result<LoanTransaction, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.try_create_loan(conn, actor, input)
            .await
            .map_err(|f| f.into_engine(Operation::CreateLoan))
    }

    async fn try_create_loan<C>(
        &self,
        conn: &C,
        actor: &Actor,
        input: LoanSetupInput,
    ) -> Result<LoanTransaction, Failure>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let txn = locks::begin(conn, &self.engine).await?;
        let member = member_profiles::Entity::find_by_id(input.member_profile_id.into_inner())
            .one(&txn)
            .await?
            .ok_or(LedgerError::MemberNotFound(input.member_profile_id))?;
        ensure_in_scope(
            actor,
            "member_profile",
            input.member_profile_id,
            member.organization_id,
            member.branch_id,
        )?;

        // The receivable account's currency is the loan's currency.
        let currency = check_account(&txn, actor, input.receivable_account_id).await?;
        let entries = LoanService::setup_entries(&input, currency)?;
        for entry in &entries {
            check_account(&txn, actor, entry.account_id).await?;
        }

        let loan_id = LoanTransactionId::new();
        let now = Utc::now();
        loan_transactions::ActiveModel {
            id: Set(loan_id.into_inner()),
            organization_id: Set(actor.organization_id.into_inner()),
            branch_id: Set(actor.branch_id.into_inner()),
            member_profile_id: Set(input.member_profile_id.into_inner()),
            applied_amount: Set(input.applied_amount),
            receivable_account_id: Set(input.receivable_account_id.into_inner()),
            cash_account_id: Set(input.cash_account_id.into_inner()),
            principal: Set(Decimal::ZERO),
            total_deductions: Set(Decimal::ZERO),
            total_automatic_deductions: Set(Decimal::ZERO),
            total_manual_deductions: Set(Decimal::ZERO),
            total_add_on: Set(Decimal::ZERO),
            net_proceeds: Set(Decimal::ZERO),
            total_debit: Set(Decimal::ZERO),
            total_credit: Set(Decimal::ZERO),
            created_by: Set(actor.user_id.into_inner()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&txn)
        .await?;

        for entry in entries {
            insert_entry(&txn, loan_id, entry).await?;
        }

        let loan = self.balance_in(&txn, loan_id).await?;
        txn.commit().await?;

        info!(loan_id = %loan_id, net_proceeds = %loan.totals.net_proceeds, "Loan transaction created");
        Ok(loan)
    }

    /// Adds a manual deduction.
    ///
    /// # Errors
    ///
    /// Returns `LoanNotFound`, a deduction validation error, or
    /// `DeductionsExceedPrincipal`.
    #[instrument(skip_all, fields(user_id = %actor.user_id, %loan_id, amount = %input.amount))]
    pub async fn add_deduction<C>(
        &self,
        conn: &C,
        actor: &Actor,
        loan_id: LoanTransactionId,
        input: DeductionInput,
    ) -> Result<LoanTransaction, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        async {
            let txn = locks::begin(conn, &self.engine).await?;
            let loan = self.locked_loan(&txn, actor, loan_id).await?;
            let currency = check_account(&txn, actor, loan.receivable_account_id.into()).await?;
            LoanService::validate_deduction(&input, currency)?;
            check_account(&txn, actor, input.account_id).await?;
            insert_entry(
                &txn,
                loan_id,
                LoanService::deduction_entry(&input, LoanEntryType::Deduction),
            )
            .await?;
            let loan = self.balance_in(&txn, loan_id).await?;
            txn.commit().await?;
            Ok::<_, Failure>(loan)
        }
        .await
        .map_err(|f| f.into_engine(Operation::LoanEntry))
    }

    /// Rewrites a deduction line.
    ///
    /// # Errors
    ///
    /// Returns `EntryNotFound`, `NotADeduction`, `AlreadyDeleted`, a deduction
    /// validation error, or `DeductionsExceedPrincipal`.
    #[instrument(skip_all, fields(user_id = %actor.user_id, %entry_id))]
    pub async fn edit_deduction<C>(
        &self,
        conn: &C,
        actor: &Actor,
        entry_id: LoanTransactionEntryId,
        input: DeductionInput,
    ) -> Result<LoanTransaction, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        async {
            let txn = locks::begin(conn, &self.engine).await?;
            let (loan, model) = self.locked_entry(&txn, actor, entry_id).await?;
            let entry: LoanTransactionEntry = model.clone().into();
            LoanService::ensure_editable(&entry)?;
            let currency = check_account(&txn, actor, loan.receivable_account_id.into()).await?;
            LoanService::validate_deduction(&input, currency)?;
            check_account(&txn, actor, input.account_id).await?;

            let line = LoanService::deduction_entry(&input, model.entry_type.into());
            let mut active = model.into_active_model();
            active.account_id = Set(line.account_id.into_inner());
            active.name = Set(line.name);
            active.description = Set(line.description);
            active.debit = Set(line.debit);
            active.credit = Set(line.credit);
            active.is_add_on = Set(line.is_add_on);
            active.updated_at = Set(Utc::now().into());
            active.update(&txn).await?;

            let loan = self.balance_in(&txn, loan.id.into()).await?;
            txn.commit().await?;
            Ok::<_, Failure>(loan)
        }
        .await
        .map_err(|f| f.into_engine(Operation::LoanEntry))
    }

    /// Hides an automatic deduction from the loan's totals.
    ///
    /// # Errors
    ///
    /// Returns `EntryNotFound`, `NotAutomaticDeduction`, or `AlreadyDeleted`.
    #[instrument(skip_all, fields(user_id = %actor.user_id, %entry_id))]
    pub async fn soft_delete_automatic_deduction<C>(
        &self,
        conn: &C,
        actor: &Actor,
        entry_id: LoanTransactionEntryId,
    ) -> Result<LoanTransaction, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.set_deleted_flag(conn, actor, entry_id, true)
            .await
            .map_err(|f| f.into_engine(Operation::LoanEntry))
    }

    /// Brings a soft-deleted automatic deduction back into the totals.
    ///
    /// # Errors
    ///
    /// Returns `EntryNotFound`, `NotAutomaticDeduction`, `NotDeleted`, or
    /// `DeductionsExceedPrincipal`.
    #[instrument(skip_all, fields(user_id = %actor.user_id, %entry_id))]
    pub async fn restore_automatic_deduction<C>(
        &self,
        conn: &C,
        actor: &Actor,
        entry_id: LoanTransactionEntryId,
    ) -> Result<LoanTransaction, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.set_deleted_flag(conn, actor, entry_id, false)
            .await
            .map_err(|f| f.into_engine(Operation::LoanEntry))
    }

    async fn set_deleted_flag<C>(
        &self,
        conn: &C,
        actor: &Actor,
        entry_id: LoanTransactionEntryId,
        deleted: bool,
    ) -> Result<LoanTransaction, Failure>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let txn = locks::begin(conn, &self.engine).await?;
        let (loan, model) = self.locked_entry(&txn, actor, entry_id).await?;
        let entry: LoanTransactionEntry = model.clone().into();
        if deleted {
            LoanService::ensure_soft_deletable(&entry)?;
        } else {
            LoanService::ensure_restorable(&entry)?;
        }

        let mut active = model.into_active_model();
        active.is_automatic_deduction_deleted = Set(deleted);
        active.updated_at = Set(Utc::now().into());
        active.update(&txn).await?;

        let loan = self.balance_in(&txn, loan.id.into()).await?;
        txn.commit().await?;
        Ok(loan)
    }

    /// Permanently removes a manual line.
    ///
    /// # Errors
    ///
    /// Returns `EntryNotFound`, `AutomaticDeductionRequiresSoftDelete`, or
    /// `GeneratedLine`.
    #[instrument(skip_all, fields(user_id = %actor.user_id, %entry_id))]
    pub async fn delete_entry<C>(
        &self,
        conn: &C,
        actor: &Actor,
        entry_id: LoanTransactionEntryId,
    ) -> Result<LoanTransaction, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        async {
            let txn = locks::begin(conn, &self.engine).await?;
            let (loan, model) = self.locked_entry(&txn, actor, entry_id).await?;
            let entry: LoanTransactionEntry = model.clone().into();
            LoanService::ensure_hard_deletable(
                &entry,
                loan.receivable_account_id.into(),
                loan.cash_account_id.into(),
            )?;
            model.delete(&txn).await?;

            let loan = self.balance_in(&txn, loan.id.into()).await?;
            txn.commit().await?;
            Ok::<_, Failure>(loan)
        }
        .await
        .map_err(|f| f.into_engine(Operation::LoanEntry))
    }

    /// Refolds a loan's active lines and persists the totals.
    ///
    /// # Errors
    ///
    /// Returns `LoanNotFound`, `CrossTenantReference`,
    /// `MissingGeneratedLine`, or `DeductionsExceedPrincipal`.
    #[instrument(skip_all, fields(user_id = %actor.user_id, %loan_id))]
    pub async fn balance<C>(
        &self,
        conn: &C,
        actor: &Actor,
        loan_id: LoanTransactionId,
    ) -> Result<LoanTransaction, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        async {
            let txn = locks::begin(conn, &self.engine).await?;
            self.locked_loan(&txn, actor, loan_id).await?;
            let loan = self.balance_in(&txn, loan_id).await?;
            txn.commit().await?;
            Ok::<_, Failure>(loan)
        }
        .await
        .map_err(|f| f.into_engine(Operation::Balance))
    }

    /// Every line of a loan in the actor's scope, soft-deleted ones included.
    ///
    /// # Errors
    ///
    /// Returns `LoanNotFound`, `CrossTenantReference`, or a transient error.
    pub async fn entries<C>(
        &self,
        conn: &C,
        actor: &Actor,
        loan_id: LoanTransactionId,
    ) -> Result<Vec<LoanTransactionEntry>, EngineError>
    where
        C: ConnectionTrait,
    {
        async {
            scoped_loan(conn, actor, loan_id).await?;
            let models = loan_transaction_entries::Entity::find()
                .filter(
                    loan_transaction_entries::Column::LoanTransactionId.eq(loan_id.into_inner()),
                )
                .order_by_asc(loan_transaction_entries::Column::CreatedAt)
                .all(conn)
                .await?;
            Ok::<_, Failure>(models.into_iter().map(Into::into).collect())
        }
        .await
        .map_err(|f| f.into_engine(Operation::Balance))
    }

    pub(crate) async fn balance_in(
        &self,
        txn: &DatabaseTransaction,
        loan_id: LoanTransactionId,
    ) -> Result<LoanTransaction, Failure> {
        locks::acquire(txn, &self.engine, LockKey::Loan(loan_id)).await?;
        let loan = loan_transactions::Entity::find_by_id(loan_id.into_inner())
            .one(txn)
            .await?
            .ok_or(LoanError::LoanNotFound(loan_id))?;

        let entries: Vec<LoanTransactionEntry> = loan_transaction_entries::Entity::find()
            .filter(loan_transaction_entries::Column::LoanTransactionId.eq(loan_id.into_inner()))
            .all(txn)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();

        let balanced = LoanService::balance(
            loan.applied_amount,
            loan.receivable_account_id.into(),
            loan.cash_account_id.into(),
            &entries,
        )?;

        let now = Utc::now();
        for update in &balanced.updates {
            loan_transaction_entries::Entity::update_many()
                .col_expr(loan_transaction_entries::Column::Debit, Expr::value(update.debit))
                .col_expr(loan_transaction_entries::Column::Credit, Expr::value(update.credit))
                .col_expr(loan_transaction_entries::Column::UpdatedAt, Expr::value(now))
                .filter(loan_transaction_entries::Column::Id.eq(update.entry_id.into_inner()))
                .exec(txn)
                .await?;
        }

        let totals = balanced.totals;
        let mut active = loan.into_active_model();
        active.principal = Set(totals.principal);
        active.total_deductions = Set(totals.total_deductions);
        active.total_automatic_deductions = Set(totals.total_automatic_deductions);
        active.total_manual_deductions = Set(totals.total_manual_deductions);
        active.total_add_on = Set(totals.total_add_on);
        active.net_proceeds = Set(totals.net_proceeds);
        active.total_debit = Set(totals.total_debit);
        active.total_credit = Set(totals.total_credit);
        active.updated_at = Set(now.into());
        let loan = active.update(txn).await?;

        info!(
            %loan_id,
            principal = %totals.principal,
            total_deductions = %totals.total_deductions,
            net_proceeds = %totals.net_proceeds,
            lines_rewritten = balanced.updates.len(),
            "Loan balanced"
        );
        Ok(loan.into())
    }

    /// Loads a loan in the actor's scope and locks it for this transaction.
    async fn locked_loan(
        &self,
        txn: &DatabaseTransaction,
        actor: &Actor,
        loan_id: LoanTransactionId,
    ) -> Result<loan_transactions::Model, Failure> {
        locks::acquire(txn, &self.engine, LockKey::Loan(loan_id)).await?;
        scoped_loan(txn, actor, loan_id).await
    }

    /// Loads a line and its loan, holding the loan's lock.
    async fn locked_entry(
        &self,
        txn: &DatabaseTransaction,
        actor: &Actor,
        entry_id: LoanTransactionEntryId,
    ) -> Result<(loan_transactions::Model, loan_transaction_entries::Model), Failure> {
        let not_found = || LoanError::EntryNotFound(entry_id);
        let entry = loan_transaction_entries::Entity::find_by_id(entry_id.into_inner())
            .one(txn)
            .await?
            .ok_or_else(not_found)?;
        let loan = self
            .locked_loan(txn, actor, entry.loan_transaction_id.into())
            .await?;

        // Re-read under the lock.
        let entry = loan_transaction_entries::Entity::find_by_id(entry_id.into_inner())
            .one(txn)
            .await?
            .ok_or_else(not_found)?;
        Ok((loan, entry))
    }
}
