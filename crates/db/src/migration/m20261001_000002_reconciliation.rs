//! Reconciliation migration.
//!
//! Adds batch cash counts, disbursements, and loan transactions with their
//! entry lines.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(BATCH_LINES_SQL).await?;
        db.execute_unprepared(LOANS_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_SQL).await?;
        Ok(())
    }
}

const BATCH_LINES_SQL: &str = r"
CREATE TABLE cash_counts (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    transaction_batch_id UUID NOT NULL REFERENCES transaction_batches(id) ON DELETE CASCADE,
    organization_id UUID NOT NULL,
    branch_id UUID NOT NULL,
    bill_amount DECIMAL(19, 4) NOT NULL,
    quantity INTEGER NOT NULL,
    amount DECIMAL(19, 4) NOT NULL,
    name VARCHAR(100),
    created_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    deleted_at TIMESTAMPTZ,
    CONSTRAINT chk_cash_count_bill CHECK (bill_amount > 0),
    CONSTRAINT chk_cash_count_quantity CHECK (quantity >= 0),
    CONSTRAINT chk_cash_count_amount CHECK (amount = bill_amount * quantity)
);

CREATE INDEX idx_cash_counts_batch ON cash_counts(transaction_batch_id)
    WHERE deleted_at IS NULL;

CREATE TABLE disbursement_transactions (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    transaction_batch_id UUID NOT NULL REFERENCES transaction_batches(id) ON DELETE CASCADE,
    organization_id UUID NOT NULL,
    branch_id UUID NOT NULL,
    account_id UUID REFERENCES accounts(id),
    ledger_entry_id UUID REFERENCES ledger_entries(id),
    amount DECIMAL(19, 4) NOT NULL,
    description TEXT,
    reference_number VARCHAR(100),
    created_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    deleted_at TIMESTAMPTZ,
    CONSTRAINT chk_disbursement_amount CHECK (amount > 0)
);

CREATE INDEX idx_disbursement_transactions_batch ON disbursement_transactions(transaction_batch_id)
    WHERE deleted_at IS NULL;
";

const LOANS_SQL: &str = r"
CREATE TYPE loan_entry_type AS ENUM ('deduction', 'automatic_deduction', 'other');

CREATE TABLE loan_transactions (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    organization_id UUID NOT NULL,
    branch_id UUID NOT NULL,
    member_profile_id UUID NOT NULL REFERENCES member_profiles(id),
    applied_amount DECIMAL(19, 4) NOT NULL,
    receivable_account_id UUID NOT NULL REFERENCES accounts(id),
    cash_account_id UUID NOT NULL REFERENCES accounts(id),
    principal DECIMAL(19, 4) NOT NULL DEFAULT 0,
    total_deductions DECIMAL(19, 4) NOT NULL DEFAULT 0,
    total_automatic_deductions DECIMAL(19, 4) NOT NULL DEFAULT 0,
    total_manual_deductions DECIMAL(19, 4) NOT NULL DEFAULT 0,
    total_add_on DECIMAL(19, 4) NOT NULL DEFAULT 0,
    net_proceeds DECIMAL(19, 4) NOT NULL DEFAULT 0,
    total_debit DECIMAL(19, 4) NOT NULL DEFAULT 0,
    total_credit DECIMAL(19, 4) NOT NULL DEFAULT 0,
    created_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_loan_applied CHECK (applied_amount > 0),
    CONSTRAINT chk_loan_accounts CHECK (receivable_account_id <> cash_account_id),
    CONSTRAINT chk_loan_balanced CHECK (total_debit = total_credit)
);

CREATE INDEX idx_loan_transactions_member ON loan_transactions(member_profile_id);

CREATE TABLE loan_transaction_entries (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    loan_transaction_id UUID NOT NULL REFERENCES loan_transactions(id) ON DELETE CASCADE,
    account_id UUID NOT NULL REFERENCES accounts(id),
    entry_type loan_entry_type NOT NULL,
    name VARCHAR(255) NOT NULL,
    description TEXT,
    debit DECIMAL(19, 4) NOT NULL DEFAULT 0,
    credit DECIMAL(19, 4) NOT NULL DEFAULT 0,
    is_add_on BOOLEAN NOT NULL DEFAULT false,
    is_automatic_deduction_deleted BOOLEAN NOT NULL DEFAULT false,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_loan_entry_amounts CHECK (debit >= 0 AND credit >= 0 AND NOT (debit > 0 AND credit > 0)),
    CONSTRAINT chk_loan_entry_soft_delete CHECK (
        NOT is_automatic_deduction_deleted OR entry_type = 'automatic_deduction'
    )
);

CREATE INDEX idx_loan_transaction_entries_loan ON loan_transaction_entries(loan_transaction_id);

ALTER TABLE ledger_entries
    ADD CONSTRAINT fk_ledger_entries_loan
    FOREIGN KEY (loan_transaction_id) REFERENCES loan_transactions(id);
";

const DROP_SQL: &str = r"
ALTER TABLE ledger_entries DROP CONSTRAINT IF EXISTS fk_ledger_entries_loan;
DROP TABLE IF EXISTS loan_transaction_entries CASCADE;
DROP TABLE IF EXISTS loan_transactions CASCADE;
DROP TYPE IF EXISTS loan_entry_type;
DROP TABLE IF EXISTS disbursement_transactions CASCADE;
DROP TABLE IF EXISTS cash_counts CASCADE;
";
