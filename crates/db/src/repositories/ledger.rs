//! Ledger poster: the append-only writer for ledger entries.
//!
//! Every write opens a scoped transaction on the caller's connection. On a pool
//! connection that is a real transaction; inside a caller's transaction it is a
//! savepoint, so an error here rolls back only this operation's writes and the
//! caller decides the rest.

use chrono::Utc;
use coopbooks_core::ledger::{
    AccountInfo, Actor, BalanceSummary, EntrySide, LedgerEntry, LedgerError, LedgerService,
    PostingRequest, TransferRequest, aggregate,
};
use coopbooks_core::{EngineError, Operation};
use coopbooks_shared::config::EngineConfig;
use coopbooks_shared::types::{
    AccountId, Currency, LedgerEntryId, MediaId, MemberProfileId, PaymentTypeId, TransactionId,
};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QuerySelect, Select, Set, TransactionTrait,
};
use tracing::{debug, info, instrument};

use super::transaction::{OpenTransactionInput, TransactionRepository};
use crate::entities::{
    accounts, ledger_entries, loan_transactions, member_joint_accounts, member_profiles,
};
use crate::error::{Failure, is_unique_violation};
use crate::locks::{self, LockKey};

impl From<ledger_entries::Model> for LedgerEntry {
    fn from(model: ledger_entries::Model) -> Self {
        Self {
            id: model.id.into(),
            organization_id: model.organization_id.into(),
            branch_id: model.branch_id.into(),
            account_id: model.account_id.into(),
            member_profile_id: model.member_profile_id.map(Into::into),
            member_joint_account_id: model.member_joint_account_id.map(Into::into),
            transaction_id: model.transaction_id.map(Into::into),
            loan_transaction_id: model.loan_transaction_id.map(Into::into),
            source: model.source.into(),
            debit: model.debit,
            credit: model.credit,
            entry_date: model.entry_date,
            description: model.description,
            reference_number: model.reference_number,
            bank_reference: model.bank_reference,
            payment_type_id: model.payment_type_id.map(Into::into),
            proof_of_payment_media_id: model.proof_of_payment_media_id.map(Into::into),
            signature_media_id: model.signature_media_id.map(Into::into),
            print_number: model.print_number,
            reverses_entry_id: model.reverses_entry_id.map(Into::into),
            created_by: model.created_by.into(),
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

fn balance_lock(request: &PostingRequest) -> LockKey {
    LockKey::Balance {
        account_id: request.account_id,
        member_profile_id: request.member_profile_id,
    }
}

/// The balance lock a posting will take for its policy check, if any.
fn policy_lock(request: &PostingRequest) -> Option<LockKey> {
    (request.debit > Decimal::ZERO
        && LedgerService::requires_policy_check(EntrySide::Debit, request.source))
    .then(|| balance_lock(request))
}

/// Loads an account and checks it is in the actor's scope.
pub(crate) async fn scoped_account<C>(
    conn: &C,
    actor: &Actor,
    account_id: AccountId,
) -> Result<AccountInfo, Failure>
where
    C: ConnectionTrait,
{
    let model = accounts::Entity::find_by_id(account_id.into_inner())
        .one(conn)
        .await?
        .ok_or(LedgerError::AccountNotFound(account_id))?;
    LedgerService::ensure_in_scope(
        actor,
        "account",
        account_id,
        model.organization_id.into(),
        model.branch_id.into(),
    )?;
    let currency: Currency = model.currency.parse().map_err(DbErr::Type)?;
    Ok(AccountInfo {
        id: account_id,
        organization_id: model.organization_id.into(),
        branch_id: model.branch_id.into(),
        currency,
    })
}

/// Restricts a ledger query to one member's lines, or to lines with no member.
fn for_member(
    query: Select<ledger_entries::Entity>,
    member_profile_id: Option<MemberProfileId>,
) -> Select<ledger_entries::Entity> {
    match member_profile_id {
        Some(member) => {
            query.filter(ledger_entries::Column::MemberProfileId.eq(member.into_inner()))
        }
        None => query.filter(ledger_entries::Column::MemberProfileId.is_null()),
    }
}

/// Folds the stored entries of an account for one member.
async fn running_balance<C>(
    conn: &C,
    account_id: AccountId,
    member_profile_id: Option<MemberProfileId>,
) -> Result<BalanceSummary, DbErr>
where
    C: ConnectionTrait,
{
    let query = ledger_entries::Entity::find()
        .filter(ledger_entries::Column::AccountId.eq(account_id.into_inner()));
    let rows: Vec<(Decimal, Decimal)> = for_member(query, member_profile_id)
        .select_only()
        .column(ledger_entries::Column::Debit)
        .column(ledger_entries::Column::Credit)
        .into_tuple()
        .all(conn)
        .await?;
    Ok(aggregate(rows))
}

/// Append-only writer for ledger entries.
#[derive(Debug, Clone, Default)]
pub struct LedgerPoster {
    engine: EngineConfig,
}

impl LedgerPoster {
    /// Creates a new poster.
    #[must_use]
    pub const fn new(engine: EngineConfig) -> Self {
        Self { engine }
    }

    /// Appends one entry.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad amounts or cross-tenant references,
    /// a not-found error for missing references, a policy conflict for a
    /// withdrawal the actor's balance policy forbids, or a transient error.
    #[instrument(skip_all, fields(user_id = %actor.user_id, account_id = %request.account_id))]
    pub async fn post<C>(
        &self,
        conn: &C,
        actor: &Actor,
        request: PostingRequest,
    ) -> Result<LedgerEntry, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.try_post(conn, actor, request)
            .await
            .map_err(|f| f.into_engine(Operation::Post))
    }

    async fn try_post<C>(
        &self,
        conn: &C,
        actor: &Actor,
        request: PostingRequest,
    ) -> Result<LedgerEntry, Failure>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let txn = locks::begin(conn, &self.engine).await?;
        let entry = self.post_in(&txn, actor, request).await?;
        txn.commit().await?;
        Ok(entry)
    }

    /// Appends every posting or none of them.
    ///
    /// # Errors
    ///
    /// Returns `EmptyPosting` for an empty list, otherwise the first posting
    /// error. Nothing is written when any posting fails.
    #[instrument(skip_all, fields(user_id = %actor.user_id, count = requests.len()))]
    pub async fn post_many<C>(
        &self,
        conn: &C,
        actor: &Actor,
        requests: Vec<PostingRequest>,
    ) -> Result<Vec<LedgerEntry>, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.try_post_many(conn, actor, requests)
            .await
            .map_err(|f| f.into_engine(Operation::PostMany))
    }

    async fn try_post_many<C>(
        &self,
        conn: &C,
        actor: &Actor,
        requests: Vec<PostingRequest>,
    ) -> Result<Vec<LedgerEntry>, Failure>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        if requests.is_empty() {
            return Err(LedgerError::EmptyPosting.into());
        }

        let txn = locks::begin(conn, &self.engine).await?;
        locks::acquire_all(&txn, &self.engine, requests.iter().filter_map(policy_lock)).await?;
        let mut entries = Vec::with_capacity(requests.len());
        for request in requests {
            entries.push(self.post_in(&txn, actor, request).await?);
        }
        txn.commit().await?;
        Ok(entries)
    }

    /// Posts a matched debit/credit pair under one teller transaction.
    ///
    /// A transaction header is opened when the transfer names none.
    ///
    /// # Errors
    ///
    /// Returns `SameAccountTransfer` or any posting error of either leg.
    #[instrument(skip_all, fields(
        user_id = %actor.user_id,
        from = %transfer.from_account_id,
        to = %transfer.to_account_id,
        amount = %transfer.amount
    ))]
    pub async fn post_transfer<C>(
        &self,
        conn: &C,
        actor: &Actor,
        transfer: TransferRequest,
    ) -> Result<Vec<LedgerEntry>, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.try_post_transfer(conn, actor, transfer)
            .await
            .map_err(|f| f.into_engine(Operation::Transfer))
    }

    async fn try_post_transfer<C>(
        &self,
        conn: &C,
        actor: &Actor,
        transfer: TransferRequest,
    ) -> Result<Vec<LedgerEntry>, Failure>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let legs = LedgerService::transfer_requests(&transfer)?;

        let txn = locks::begin(conn, &self.engine).await?;
        let transaction_id = match transfer.transaction_id {
            Some(id) => id,
            None => {
                let input = OpenTransactionInput {
                    member_profile_id: transfer.member_profile_id,
                    description: transfer.description.clone(),
                };
                TransactionRepository::open_in(&txn, actor, input).await?.id
            }
        };

        let mut entries = Vec::with_capacity(legs.len());
        for leg in legs {
            entries.push(
                self.post_in(&txn, actor, leg.in_transaction(transaction_id))
                    .await?,
            );
        }
        txn.commit().await?;
        Ok(entries)
    }

    /// Posts the reversal of an entry.
    ///
    /// # Errors
    ///
    /// Returns `EntryNotFound`, `CannotReverseReversal`, `AlreadyReversed`, or
    /// any posting error.
    #[instrument(skip_all, fields(user_id = %actor.user_id, entry_id = %entry_id))]
    pub async fn reverse<C>(
        &self,
        conn: &C,
        actor: &Actor,
        entry_id: LedgerEntryId,
        reason: Option<&str>,
    ) -> Result<LedgerEntry, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.try_reverse(conn, actor, entry_id, reason)
            .await
            .map_err(|f| f.into_engine(Operation::Reverse))
    }

    async fn try_reverse<C>(
        &self,
        conn: &C,
        actor: &Actor,
        entry_id: LedgerEntryId,
        reason: Option<&str>,
    ) -> Result<LedgerEntry, Failure>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let txn = locks::begin(conn, &self.engine).await?;
        let reversal = self.reverse_in(&txn, actor, entry_id, reason).await?;
        txn.commit().await?;
        Ok(reversal)
    }

    pub(crate) async fn reverse_in(
        &self,
        txn: &DatabaseTransaction,
        actor: &Actor,
        entry_id: LedgerEntryId,
        reason: Option<&str>,
    ) -> Result<LedgerEntry, Failure> {
        let original: LedgerEntry = Self::find_scoped(txn, actor, entry_id).await?.into();
        let request = LedgerService::reversal_request(&original, reason, Utc::now().date_naive())?;

        let existing = ledger_entries::Entity::find()
            .filter(ledger_entries::Column::ReversesEntryId.eq(entry_id.into_inner()))
            .one(txn)
            .await?;
        if existing.is_some() {
            return Err(LedgerError::AlreadyReversed(entry_id).into());
        }

        let reversal = self.append_in(txn, actor, request, Some(original.id)).await?;
        info!(
            entry_id = %entry_id,
            reversal_id = %reversal.id,
            amount = %original.amount(),
            "Ledger entry reversed"
        );
        Ok(reversal)
    }

    /// Returns the entry's passbook print number, assigning the next one in
    /// its branch+account+member sequence if it has none.
    ///
    /// # Errors
    ///
    /// Returns `EntryNotFound`, `CrossTenantReference`, or a transient error.
    #[instrument(skip_all, fields(user_id = %actor.user_id, entry_id = %entry_id))]
    pub async fn assign_print_number<C>(
        &self,
        conn: &C,
        actor: &Actor,
        entry_id: LedgerEntryId,
    ) -> Result<i64, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.try_assign_print_number(conn, actor, entry_id)
            .await
            .map_err(|f| f.into_engine(Operation::AssignPrintNumber))
    }

    async fn try_assign_print_number<C>(
        &self,
        conn: &C,
        actor: &Actor,
        entry_id: LedgerEntryId,
    ) -> Result<i64, Failure>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let txn = locks::begin(conn, &self.engine).await?;
        let entry = Self::find_scoped(&txn, actor, entry_id).await?;
        let member_profile_id = entry.member_profile_id.map(MemberProfileId::from);

        locks::acquire(
            &txn,
            &self.engine,
            LockKey::PrintSequence {
                branch_id: entry.branch_id.into(),
                account_id: entry.account_id.into(),
                member_profile_id,
            },
        )
        .await?;

        // Re-read under the lock; a concurrent call may have numbered it.
        let current: Option<Option<i64>> = ledger_entries::Entity::find_by_id(entry.id)
            .select_only()
            .column(ledger_entries::Column::PrintNumber)
            .into_tuple()
            .one(&txn)
            .await?;
        if let Some(number) = current.flatten() {
            txn.commit().await?;
            return Ok(number);
        }

        let query = ledger_entries::Entity::find()
            .filter(ledger_entries::Column::BranchId.eq(entry.branch_id))
            .filter(ledger_entries::Column::AccountId.eq(entry.account_id));
        let max: Option<Option<i64>> = for_member(query, member_profile_id)
            .select_only()
            .column_as(ledger_entries::Column::PrintNumber.max(), "max_print_number")
            .into_tuple()
            .one(&txn)
            .await?;
        let number = LedgerService::next_print_number(max.flatten());

        ledger_entries::Entity::update_many()
            .col_expr(ledger_entries::Column::PrintNumber, Expr::value(number))
            .filter(ledger_entries::Column::Id.eq(entry.id))
            .filter(ledger_entries::Column::PrintNumber.is_null())
            .exec(&txn)
            .await?;
        txn.commit().await?;

        debug!(entry_id = %entry_id, print_number = number, "Print number assigned");
        Ok(number)
    }

    /// Running balance of an account for one member, or for entries with no
    /// member when `member_profile_id` is `None`.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound`, `MemberNotFound`, `CrossTenantReference`, or
    /// a transient error.
    pub async fn balance<C>(
        &self,
        conn: &C,
        actor: &Actor,
        account_id: AccountId,
        member_profile_id: Option<MemberProfileId>,
    ) -> Result<BalanceSummary, EngineError>
    where
        C: ConnectionTrait,
    {
        async {
            scoped_account(conn, actor, account_id).await?;
            if let Some(member_id) = member_profile_id {
                Self::check_member(conn, actor, member_id).await?;
            }
            Ok::<_, Failure>(running_balance(conn, account_id, member_profile_id).await?)
        }
        .await
        .map_err(|f| f.into_engine(Operation::ReadBalance))
    }

    /// Folds every entry of a teller transaction.
    ///
    /// A transaction whose legs net out reports `is_balanced()`.
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotFound`, `CrossTenantReference`, or a transient
    /// error.
    pub async fn transaction_summary<C>(
        &self,
        conn: &C,
        actor: &Actor,
        transaction_id: TransactionId,
    ) -> Result<BalanceSummary, EngineError>
    where
        C: ConnectionTrait,
    {
        async {
            TransactionRepository::find_scoped(conn, actor, transaction_id).await?;
            let rows: Vec<(Decimal, Decimal)> = ledger_entries::Entity::find()
                .filter(ledger_entries::Column::TransactionId.eq(transaction_id.into_inner()))
                .select_only()
                .column(ledger_entries::Column::Debit)
                .column(ledger_entries::Column::Credit)
                .into_tuple()
                .all(conn)
                .await?;
            Ok::<_, Failure>(aggregate(rows))
        }
        .await
        .map_err(|f| f.into_engine(Operation::ReadBalance))
    }

    /// Finds an entry in the actor's scope.
    ///
    /// # Errors
    ///
    /// Returns `EntryNotFound`, `CrossTenantReference`, or a transient error.
    pub async fn find_entry<C>(
        &self,
        conn: &C,
        actor: &Actor,
        entry_id: LedgerEntryId,
    ) -> Result<LedgerEntry, EngineError>
    where
        C: ConnectionTrait,
    {
        Self::find_scoped(conn, actor, entry_id)
            .await
            .map(Into::into)
            .map_err(|f| f.into_engine(Operation::ReadBalance))
    }

    /// Validates and appends one entry inside `txn`.
    pub(crate) async fn post_in(
        &self,
        txn: &DatabaseTransaction,
        actor: &Actor,
        request: PostingRequest,
    ) -> Result<LedgerEntry, Failure> {
        self.append_in(txn, actor, request, None).await
    }

    /// Appends one entry. `reverses` is only ever the id of an entry that
    /// [`Self::reverse_in`] loaded in the actor's scope and mirrored.
    async fn append_in(
        &self,
        txn: &DatabaseTransaction,
        actor: &Actor,
        request: PostingRequest,
        reverses: Option<LedgerEntryId>,
    ) -> Result<LedgerEntry, Failure> {
        let account = scoped_account(txn, actor, request.account_id).await?;
        let (side, amount) =
            LedgerService::validate_amounts(request.debit, request.credit, account.currency)?;
        Self::check_references(txn, actor, &request).await?;

        if LedgerService::requires_policy_check(side, request.source) {
            locks::acquire(txn, &self.engine, balance_lock(&request)).await?;
            let current =
                running_balance(txn, request.account_id, request.member_profile_id).await?;
            let balance_after =
                LedgerService::check_balance_policy(&actor.balance_policy, &current, amount)?;
            debug!(%balance_after, "Balance policy satisfied");
        }

        let model = ledger_entries::ActiveModel {
            id: Set(LedgerEntryId::new().into_inner()),
            organization_id: Set(actor.organization_id.into_inner()),
            branch_id: Set(actor.branch_id.into_inner()),
            account_id: Set(request.account_id.into_inner()),
            member_profile_id: Set(request.member_profile_id.map(MemberProfileId::into_inner)),
            member_joint_account_id: Set(request.member_joint_account_id.map(Into::into)),
            transaction_id: Set(request.transaction_id.map(TransactionId::into_inner)),
            loan_transaction_id: Set(request.loan_transaction_id.map(Into::into)),
            source: Set(request.source.into()),
            debit: Set(request.debit),
            credit: Set(request.credit),
            entry_date: Set(request
                .entry_date
                .unwrap_or_else(|| Utc::now().date_naive())),
            description: Set(request.description),
            reference_number: Set(request.reference_number),
            bank_reference: Set(request.bank_reference),
            payment_type_id: Set(request.payment_type_id.map(PaymentTypeId::into_inner)),
            proof_of_payment_media_id: Set(request.proof_of_payment_media_id.map(MediaId::into_inner)),
            signature_media_id: Set(request.signature_media_id.map(MediaId::into_inner)),
            print_number: Set(None),
            reverses_entry_id: Set(reverses.map(LedgerEntryId::into_inner)),
            created_by: Set(actor.user_id.into_inner()),
            created_at: Set(Utc::now().into()),
        }
        .insert(txn)
        .await
        .map_err(|err| match reverses {
            Some(original) if is_unique_violation(&err) => {
                Failure::from(LedgerError::AlreadyReversed(original))
            }
            _ => Failure::from(err),
        })?;

        info!(
            entry_id = %model.id,
            account_id = %model.account_id,
            source = %request.source,
            debit = %model.debit,
            credit = %model.credit,
            "Ledger entry posted"
        );
        Ok(model.into())
    }

    async fn check_member<C>(
        conn: &C,
        actor: &Actor,
        member_id: MemberProfileId,
    ) -> Result<(), Failure>
    where
        C: ConnectionTrait,
    {
        let member = member_profiles::Entity::find_by_id(member_id.into_inner())
            .one(conn)
            .await?
            .ok_or(LedgerError::MemberNotFound(member_id))?;
        LedgerService::ensure_in_scope(
            actor,
            "member_profile",
            member_id,
            member.organization_id.into(),
            member.branch_id.into(),
        )?;
        Ok(())
    }

    async fn check_references(
        txn: &DatabaseTransaction,
        actor: &Actor,
        request: &PostingRequest,
    ) -> Result<(), Failure> {
        if let Some(member_id) = request.member_profile_id {
            Self::check_member(txn, actor, member_id).await?;
        }

        if let Some(joint_id) = request.member_joint_account_id {
            let joint = member_joint_accounts::Entity::find_by_id(joint_id.into_inner())
                .one(txn)
                .await?
                .ok_or(LedgerError::JointAccountNotFound(joint_id))?;
            LedgerService::ensure_in_scope(
                actor,
                "member_joint_account",
                joint_id,
                joint.organization_id.into(),
                joint.branch_id.into(),
            )?;
            if let Some(member_id) = request.member_profile_id
                && member_id.into_inner() != joint.member_profile_id
            {
                return Err(LedgerError::JointAccountMemberMismatch(joint_id).into());
            }
        }

        if let Some(transaction_id) = request.transaction_id {
            TransactionRepository::find_scoped(txn, actor, transaction_id).await?;
        }

        if let Some(loan_id) = request.loan_transaction_id {
            let loan = loan_transactions::Entity::find_by_id(loan_id.into_inner())
                .one(txn)
                .await?
                .ok_or(LedgerError::LoanTransactionNotFound(loan_id))?;
            LedgerService::ensure_in_scope(
                actor,
                "loan_transaction",
                loan_id,
                loan.organization_id.into(),
                loan.branch_id.into(),
            )?;
        }

        Ok(())
    }

    async fn find_scoped<C>(
        conn: &C,
        actor: &Actor,
        entry_id: LedgerEntryId,
    ) -> Result<ledger_entries::Model, Failure>
    where
        C: ConnectionTrait,
    {
        let model = ledger_entries::Entity::find_by_id(entry_id.into_inner())
            .one(conn)
            .await?
            .ok_or(LedgerError::EntryNotFound(entry_id))?;
        LedgerService::ensure_in_scope(
            actor,
            "ledger_entry",
            entry_id,
            model.organization_id.into(),
            model.branch_id.into(),
        )?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coopbooks_core::ledger::EntrySource;
    use rust_decimal_macros::dec;

    #[test]
    fn test_only_drawdown_debits_take_balance_lock() {
        let account = AccountId::new();
        let member = MemberProfileId::new();

        let withdrawal =
            PostingRequest::debit(account, dec!(10), EntrySource::Withdraw).for_member(member);
        assert_eq!(
            policy_lock(&withdrawal),
            Some(LockKey::Balance {
                account_id: account,
                member_profile_id: Some(member),
            })
        );

        let transfer_in = PostingRequest::credit(account, dec!(10), EntrySource::Transfer);
        assert!(policy_lock(&transfer_in).is_none());

        let fee = PostingRequest::debit(account, dec!(10), EntrySource::Payment);
        assert!(policy_lock(&fee).is_none());
    }
}
