//! Transaction-scoped advisory locks and transaction setup.
//!
//! Recomputation of an aggregate is a read-fold-write over its lines. Two
//! concurrent mutations on the same batch or loan must not interleave that
//! sequence, so each engine transaction takes `pg_advisory_xact_lock` on the
//! aggregate before reading. The lock is released when the outermost
//! transaction commits or rolls back; savepoints do not release it.

use std::collections::BTreeSet;

use coopbooks_shared::config::EngineConfig;
use coopbooks_shared::types::{
    AccountId, BranchId, LoanTransactionId, MemberProfileId, OrganizationId,
    TransactionBatchId, UserId,
};
use sea_orm::{
    ConnectionTrait, DatabaseTransaction, DbBackend, DbErr, Statement, TransactionTrait,
};

/// An aggregate whose read-modify-write must be serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKey {
    /// Batch totals.
    Batch(TransactionBatchId),
    /// Loan totals.
    Loan(LoanTransactionId),
    /// Running balance of an account for one member (or for no member).
    Balance {
        /// Account.
        account_id: AccountId,
        /// Member, if any.
        member_profile_id: Option<MemberProfileId>,
    },
    /// Passbook print sequence.
    PrintSequence {
        /// Branch.
        branch_id: BranchId,
        /// Account.
        account_id: AccountId,
        /// Member, if any.
        member_profile_id: Option<MemberProfileId>,
    },
    /// The one-open-batch slot of a teller in a branch.
    ActorBatch {
        /// Teller.
        user_id: UserId,
        /// Organization.
        organization_id: OrganizationId,
        /// Branch.
        branch_id: BranchId,
    },
}

impl LockKey {
    /// Text hashed into the 64-bit advisory lock key.
    #[must_use]
    pub fn name(&self) -> String {
        let member = |m: &Option<MemberProfileId>| {
            m.map_or_else(|| "none".to_string(), |m| m.to_string())
        };
        match self {
            Self::Batch(id) => format!("batch:{id}"),
            Self::Loan(id) => format!("loan:{id}"),
            Self::Balance {
                account_id,
                member_profile_id,
            } => format!("balance:{account_id}:{}", member(member_profile_id)),
            Self::PrintSequence {
                branch_id,
                account_id,
                member_profile_id,
            } => format!(
                "print:{branch_id}:{account_id}:{}",
                member(member_profile_id)
            ),
            Self::ActorBatch {
                user_id,
                organization_id,
                branch_id,
            } => format!("open_batch:{user_id}:{organization_id}:{branch_id}"),
        }
    }
}

/// Blocks until the current transaction holds the lock for `key`.
///
/// A no-op when aggregate serialization is disabled.
pub async fn acquire<C>(conn: &C, engine: &EngineConfig, key: LockKey) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    if !engine.serialize_aggregates {
        return Ok(());
    }
    lock_name(conn, key.name()).await
}

/// Takes several locks in name order.
///
/// Callers that lock more than one aggregate go through here so two
/// transactions never wait on each other's locks in opposite order.
pub async fn acquire_all<C, I>(conn: &C, engine: &EngineConfig, keys: I) -> Result<(), DbErr>
where
    C: ConnectionTrait,
    I: IntoIterator<Item = LockKey>,
{
    if !engine.serialize_aggregates {
        return Ok(());
    }
    let names: BTreeSet<String> = keys.into_iter().map(|key| key.name()).collect();
    for name in names {
        lock_name(conn, name).await?;
    }
    Ok(())
}

async fn lock_name<C>(conn: &C, name: String) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    tracing::trace!(lock = %name, "Acquiring advisory lock");
    conn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT pg_advisory_xact_lock(hashtextextended($1, 0))",
        [name.into()],
    ))
    .await?;
    Ok(())
}

/// Opens the engine's scoped transaction on `conn`.
///
/// On a pool connection this starts a transaction; inside a caller's
/// transaction it opens a savepoint. Dropping the returned handle without
/// committing rolls it back.
pub async fn begin<C>(conn: &C, engine: &EngineConfig) -> Result<DatabaseTransaction, DbErr>
where
    C: TransactionTrait,
{
    let txn = conn.begin().await?;
    if let Some(timeout_ms) = engine.lock_timeout_ms {
        txn.execute_unprepared(&format!("SET LOCAL lock_timeout = {timeout_ms}"))
            .await?;
    }
    Ok(txn)
}
