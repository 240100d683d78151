//! Database migration runner for Coopbooks.
//!
//! Reads `DATABASE_URL` from the environment or a `.env` file.
//!
//! Usage:
//!   migrator up      - Apply the ledger and reconciliation schema
//!   migrator down    - Roll back the last migration
//!   migrator status  - Show which migrations are applied
//!   migrator fresh   - Drop everything and re-apply

use coopbooks_db::migration::Migrator;
use sea_orm_migration::prelude::*;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // The CLI installs its own tracing subscriber.
    cli::run_cli(Migrator).await;
}
