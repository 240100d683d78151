//! Database layer with `SeaORM` entities and the transactional posting engine.
//!
//! This crate provides:
//! - `SeaORM` entity definitions
//! - Database migrations
//! - Per-aggregate advisory locks
//! - The ledger poster, batch reconciler, and loan balancer

pub mod entities;
mod error;
pub mod locks;
pub mod migration;
pub mod repositories;

pub use repositories::{
    BatchReconciler, BatchUpdate, LedgerPoster, LoanBalancer, OpenTransactionInput,
    TellerTransaction, TransactionRepository,
};

use std::time::Duration;

use coopbooks_shared::config::DatabaseConfig;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

/// Establishes a connection pool to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .sqlx_logging(false);

    tracing::debug!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Connecting to database"
    );
    Database::connect(options).await
}
