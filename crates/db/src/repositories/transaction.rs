//! Teller transaction headers.
//!
//! A teller transaction groups the ledger entries of one counter action. It is
//! linked to the acting teller's open batch when one exists.

use chrono::{DateTime, Utc};
use coopbooks_core::ledger::{Actor, LedgerError, LedgerService};
use coopbooks_core::{EngineError, Operation};
use coopbooks_shared::config::EngineConfig;
use coopbooks_shared::types::{
    BranchId, MemberProfileId, OrganizationId, TransactionBatchId, TransactionId, UserId,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::entities::{member_profiles, transaction_batches, transactions};
use crate::error::Failure;
use crate::locks;

/// Input for opening a teller transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenTransactionInput {
    /// Member served at the counter.
    pub member_profile_id: Option<MemberProfileId>,
    /// Free-text description.
    pub description: Option<String>,
}

/// A stored teller transaction header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TellerTransaction {
    /// Transaction ID.
    pub id: TransactionId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Owning branch.
    pub branch_id: BranchId,
    /// Batch open when the transaction started.
    pub transaction_batch_id: Option<TransactionBatchId>,
    /// Member served.
    pub member_profile_id: Option<MemberProfileId>,
    /// Description.
    pub description: Option<String>,
    /// Teller.
    pub created_by: UserId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<transactions::Model> for TellerTransaction {
    fn from(model: transactions::Model) -> Self {
        Self {
            id: model.id.into(),
            organization_id: model.organization_id.into(),
            branch_id: model.branch_id.into(),
            transaction_batch_id: model.transaction_batch_id.map(Into::into),
            member_profile_id: model.member_profile_id.map(Into::into),
            description: model.description,
            created_by: model.created_by.into(),
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

/// Repository for teller transaction headers.
#[derive(Debug, Clone, Default)]
pub struct TransactionRepository {
    engine: EngineConfig,
}

impl TransactionRepository {
    /// Creates a new transaction repository.
    #[must_use]
    pub const fn new(engine: EngineConfig) -> Self {
        Self { engine }
    }

    /// Opens a teller transaction in the actor's scope.
    ///
    /// # Errors
    ///
    /// Returns `MemberNotFound` or `CrossTenantReference` for a bad member, or a
    /// transient error if the database fails.
    #[instrument(skip_all, fields(user_id = %actor.user_id))]
    pub async fn open<C>(
        &self,
        conn: &C,
        actor: &Actor,
        input: OpenTransactionInput,
    ) -> Result<TellerTransaction, EngineError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        self.try_open(conn, actor, input)
            .await
            .map_err(|f| f.into_engine(Operation::OpenTransaction))
    }

    async fn try_open<C>(
        &self,
        conn: &C,
        actor: &Actor,
        input: OpenTransactionInput,
    ) -> Result<TellerTransaction, Failure>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let txn = locks::begin(conn, &self.engine).await?;
        let header = Self::open_in(&txn, actor, input).await?;
        txn.commit().await?;
        Ok(header)
    }

    /// Finds a teller transaction in the actor's scope.
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotFound`, `CrossTenantReference`, or a transient
    /// error.
    pub async fn find<C>(
        &self,
        conn: &C,
        actor: &Actor,
        id: TransactionId,
    ) -> Result<TellerTransaction, EngineError>
    where
        C: ConnectionTrait,
    {
        Self::find_scoped(conn, actor, id)
            .await
            .map(Into::into)
            .map_err(|f| f.into_engine(Operation::OpenTransaction))
    }

    pub(crate) async fn open_in(
        txn: &DatabaseTransaction,
        actor: &Actor,
        input: OpenTransactionInput,
    ) -> Result<TellerTransaction, Failure> {
        if let Some(member_id) = input.member_profile_id {
            let member = member_profiles::Entity::find_by_id(member_id.into_inner())
                .one(txn)
                .await?
                .ok_or(LedgerError::MemberNotFound(member_id))?;
            LedgerService::ensure_in_scope(
                actor,
                "member_profile",
                member_id,
                member.organization_id.into(),
                member.branch_id.into(),
            )?;
        }

        let open_batch = transaction_batches::Entity::find()
            .filter(transaction_batches::Column::EmployeeUserId.eq(actor.user_id.into_inner()))
            .filter(
                transaction_batches::Column::OrganizationId.eq(actor.organization_id.into_inner()),
            )
            .filter(transaction_batches::Column::BranchId.eq(actor.branch_id.into_inner()))
            .filter(transaction_batches::Column::IsClosed.eq(false))
            .one(txn)
            .await?;

        let model = transactions::ActiveModel {
            id: Set(TransactionId::new().into_inner()),
            organization_id: Set(actor.organization_id.into_inner()),
            branch_id: Set(actor.branch_id.into_inner()),
            transaction_batch_id: Set(open_batch.map(|b| b.id)),
            member_profile_id: Set(input.member_profile_id.map(MemberProfileId::into_inner)),
            description: Set(input.description),
            created_by: Set(actor.user_id.into_inner()),
            created_at: Set(Utc::now().into()),
        }
        .insert(txn)
        .await?;

        info!(
            transaction_id = %model.id,
            batch_id = ?model.transaction_batch_id,
            "Teller transaction opened"
        );
        Ok(model.into())
    }

    pub(crate) async fn find_scoped<C>(
        conn: &C,
        actor: &Actor,
        id: TransactionId,
    ) -> Result<transactions::Model, Failure>
    where
        C: ConnectionTrait,
    {
        let model = transactions::Entity::find_by_id(id.into_inner())
            .one(conn)
            .await?
            .ok_or(LedgerError::TransactionNotFound(id))?;
        LedgerService::ensure_in_scope(
            actor,
            "transaction",
            id,
            model.organization_id.into(),
            model.branch_id.into(),
        )?;
        Ok(model)
    }
}
