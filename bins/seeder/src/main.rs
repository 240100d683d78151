//! Demo data seeder for Coopbooks development and testing.
//!
//! Seeds a demo branch with a chart of accounts and a member, then runs one
//! teller day through the engine: a deposit, a withdrawal, cash counts, a
//! booked disbursement, and a loan with automatic deductions.
//!
//! Usage: cargo run --bin seeder

use anyhow::Context;
use chrono::Utc;
use coopbooks_core::batch::{CashCountInput, DisbursementInput, OpenBatchInput};
use coopbooks_core::ledger::{Actor, EntrySource, PostingRequest};
use coopbooks_core::loan::{DeductionInput, LoanSetupInput};
use coopbooks_db::entities::{accounts, member_profiles};
use coopbooks_db::{BatchReconciler, LedgerPoster, LoanBalancer};
use coopbooks_shared::config::{AppConfig, LogConfig};
use coopbooks_shared::types::{AccountId, BranchId, Currency, MemberProfileId, OrganizationId, UserId};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Demo organization ID (consistent for all seeds)
const DEMO_ORG_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0001);
/// Demo branch ID
const DEMO_BRANCH_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0002);
/// Demo teller ID
const DEMO_TELLER_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0003);
/// Demo member ID
const DEMO_MEMBER_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0004);

/// Chart of accounts: (id suffix, code, name).
const ACCOUNTS: [(u128, &str, &str); 6] = [
    (0x10, "1010", "Cash on hand"),
    (0x11, "1210", "Loans receivable"),
    (0x12, "2010", "Savings deposits"),
    (0x13, "2110", "Loan insurance payable"),
    (0x14, "4010", "Service fee income"),
    (0x15, "5010", "Office supplies expense"),
];

fn account_id(suffix: u128) -> AccountId {
    AccountId::from_uuid(Uuid::from_u128(suffix))
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| log.filter.clone().into());
    let registry = tracing_subscriber::registry().with(filter);
    if log.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.log);

    let db = coopbooks_db::connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    info!("Connected to database");

    seed_accounts(&db).await?;
    seed_member(&db).await?;

    let teller = Actor::new(
        UserId::from_uuid(DEMO_TELLER_ID),
        OrganizationId::from_uuid(DEMO_ORG_ID),
        BranchId::from_uuid(DEMO_BRANCH_ID),
    );
    let member = MemberProfileId::from_uuid(DEMO_MEMBER_ID);

    seed_teller_day(&db, &config, &teller, member).await?;
    seed_loan(&db, &config, &teller, member).await?;

    info!("Seeding complete");
    Ok(())
}

/// Seeds the demo chart of accounts, skipping accounts that exist.
async fn seed_accounts(db: &DatabaseConnection) -> anyhow::Result<()> {
    for (suffix, code, name) in ACCOUNTS {
        let id = account_id(suffix);
        if accounts::Entity::find_by_id(id.into_inner())
            .one(db)
            .await?
            .is_some()
        {
            info!(code, "Account already exists, skipping");
            continue;
        }

        accounts::ActiveModel {
            id: Set(id.into_inner()),
            organization_id: Set(DEMO_ORG_ID),
            branch_id: Set(DEMO_BRANCH_ID),
            code: Set(code.to_string()),
            name: Set(name.to_string()),
            currency: Set(Currency::Php.code().to_string()),
            created_at: Set(Utc::now().into()),
        }
        .insert(db)
        .await
        .with_context(|| format!("Failed to insert account {code}"))?;
        info!(code, name, "Created account");
    }
    Ok(())
}

/// Seeds the demo member.
async fn seed_member(db: &DatabaseConnection) -> anyhow::Result<()> {
    if member_profiles::Entity::find_by_id(DEMO_MEMBER_ID)
        .one(db)
        .await?
        .is_some()
    {
        info!("Demo member already exists, skipping");
        return Ok(());
    }

    member_profiles::ActiveModel {
        id: Set(DEMO_MEMBER_ID),
        organization_id: Set(DEMO_ORG_ID),
        branch_id: Set(DEMO_BRANCH_ID),
        full_name: Set("Maria Santos".to_string()),
        created_at: Set(Utc::now().into()),
    }
    .insert(db)
    .await
    .context("Failed to insert demo member")?;
    info!("Created demo member");
    Ok(())
}

/// Runs one teller day: deposit, withdrawal, cash count, and a payout.
async fn seed_teller_day(
    db: &DatabaseConnection,
    config: &AppConfig,
    teller: &Actor,
    member: MemberProfileId,
) -> anyhow::Result<()> {
    let poster = LedgerPoster::new(config.engine.clone());
    let reconciler = BatchReconciler::new(config.engine.clone());
    let savings = account_id(0x12);

    if reconciler.current_batch(db, teller).await?.is_none() {
        reconciler
            .open_batch(
                db,
                teller,
                OpenBatchInput {
                    currency: Currency::Php,
                    deposit_in_bank: dec!(0),
                },
            )
            .await?;
    }

    poster
        .post(
            db,
            teller,
            PostingRequest::credit(savings, dec!(5000.00), EntrySource::Deposit)
                .for_member(member)
                .describe("Opening savings deposit"),
        )
        .await?;
    poster
        .post(
            db,
            teller,
            PostingRequest::debit(savings, dec!(1250.00), EntrySource::Withdraw)
                .for_member(member)
                .describe("Counter withdrawal"),
        )
        .await?;

    reconciler
        .replace_cash_counts(
            db,
            teller,
            vec![
                CashCountInput::new(dec!(1000), 3),
                CashCountInput::new(dec!(500), 1),
                CashCountInput::new(dec!(100), 2),
            ],
        )
        .await?;
    reconciler
        .add_disbursement(
            db,
            teller,
            DisbursementInput::new(dec!(350.00))
                .charged_to(account_id(0x15))
                .describe("Printer paper"),
        )
        .await?;
    let totals = reconciler
        .set_deposit_in_bank(db, teller, dec!(1500.00))
        .await?;

    let balance = poster.balance(db, teller, savings, Some(member)).await?;
    info!(
        savings_balance = %balance.balance,
        grand_total = %totals.grand_total,
        total_disbursement = %totals.total_disbursement,
        "Teller day seeded"
    );
    Ok(())
}

/// Sets up a demo loan with automatic deductions.
async fn seed_loan(
    db: &DatabaseConnection,
    config: &AppConfig,
    teller: &Actor,
    member: MemberProfileId,
) -> anyhow::Result<()> {
    let balancer = LoanBalancer::new(config.engine.clone());
    let loan = balancer
        .create_loan(
            db,
            teller,
            LoanSetupInput {
                member_profile_id: member,
                applied_amount: dec!(20000.00),
                receivable_account_id: account_id(0x11),
                cash_account_id: account_id(0x10),
                automatic_deductions: vec![
                    DeductionInput {
                        account_id: account_id(0x14),
                        name: "Service fee".to_string(),
                        amount: dec!(400.00),
                        is_add_on: false,
                        description: None,
                    },
                    DeductionInput {
                        account_id: account_id(0x13),
                        name: "Loan insurance".to_string(),
                        amount: dec!(250.00),
                        is_add_on: false,
                        description: Some("Credit life insurance".to_string()),
                    },
                ],
            },
        )
        .await?;

    info!(
        loan_id = %loan.id,
        principal = %loan.totals.principal,
        net_proceeds = %loan.totals.net_proceeds,
        "Demo loan created"
    );
    Ok(())
}
