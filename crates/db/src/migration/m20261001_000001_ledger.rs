//! Ledger migration.
//!
//! Creates accounts, members, teller batches, transactions, and the
//! append-only `ledger_entries` table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(ENUMS_SQL).await?;
        db.execute_unprepared(ACCOUNTS_SQL).await?;
        db.execute_unprepared(MEMBERS_SQL).await?;
        db.execute_unprepared(TRANSACTION_BATCHES_SQL).await?;
        db.execute_unprepared(TRANSACTIONS_SQL).await?;
        db.execute_unprepared(LEDGER_ENTRIES_SQL).await?;
        db.execute_unprepared(APPEND_ONLY_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_SQL).await?;
        Ok(())
    }
}

const ENUMS_SQL: &str = r"
CREATE TYPE entry_source AS ENUM (
    'payment',
    'withdraw',
    'deposit',
    'journal_voucher',
    'check_voucher',
    'adjustment',
    'loan',
    'disbursement',
    'transfer'
);
";

const ACCOUNTS_SQL: &str = r"
CREATE TABLE accounts (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    organization_id UUID NOT NULL,
    branch_id UUID NOT NULL,
    code VARCHAR(50) NOT NULL,
    name VARCHAR(255) NOT NULL,
    currency VARCHAR(3) NOT NULL DEFAULT 'PHP',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_accounts_code UNIQUE (organization_id, branch_id, code),
    CONSTRAINT chk_accounts_currency CHECK (currency IN ('PHP', 'USD', 'EUR', 'IDR', 'SGD', 'JPY'))
);

CREATE INDEX idx_accounts_branch ON accounts(organization_id, branch_id);
";

const MEMBERS_SQL: &str = r"
CREATE TABLE member_profiles (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    organization_id UUID NOT NULL,
    branch_id UUID NOT NULL,
    full_name VARCHAR(255) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_member_profiles_branch ON member_profiles(organization_id, branch_id);

CREATE TABLE member_joint_accounts (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    organization_id UUID NOT NULL,
    branch_id UUID NOT NULL,
    member_profile_id UUID NOT NULL REFERENCES member_profiles(id) ON DELETE CASCADE,
    full_name VARCHAR(255) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_member_joint_accounts_member ON member_joint_accounts(member_profile_id);
";

const TRANSACTION_BATCHES_SQL: &str = r"
CREATE TABLE transaction_batches (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    organization_id UUID NOT NULL,
    branch_id UUID NOT NULL,
    employee_user_id UUID NOT NULL,
    currency VARCHAR(3) NOT NULL DEFAULT 'PHP',
    deposit_in_bank DECIMAL(19, 4) NOT NULL DEFAULT 0,
    cash_count_total DECIMAL(19, 4) NOT NULL DEFAULT 0,
    grand_total DECIMAL(19, 4) NOT NULL DEFAULT 0,
    total_disbursement DECIMAL(19, 4) NOT NULL DEFAULT 0,
    is_closed BOOLEAN NOT NULL DEFAULT false,
    started_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    ended_at TIMESTAMPTZ,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_batch_deposit CHECK (deposit_in_bank >= 0),
    CONSTRAINT chk_batch_grand_total CHECK (grand_total = cash_count_total + deposit_in_bank),
    CONSTRAINT chk_batch_closed CHECK (NOT is_closed OR ended_at IS NOT NULL)
);

-- At most one open batch per teller per branch
CREATE UNIQUE INDEX uq_transaction_batches_open
    ON transaction_batches(employee_user_id, organization_id, branch_id)
    WHERE NOT is_closed;

CREATE INDEX idx_transaction_batches_branch
    ON transaction_batches(organization_id, branch_id, started_at DESC);
";

const TRANSACTIONS_SQL: &str = r"
CREATE TABLE transactions (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    organization_id UUID NOT NULL,
    branch_id UUID NOT NULL,
    transaction_batch_id UUID REFERENCES transaction_batches(id),
    member_profile_id UUID REFERENCES member_profiles(id),
    description TEXT,
    created_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_transactions_batch ON transactions(transaction_batch_id)
    WHERE transaction_batch_id IS NOT NULL;
";

const LEDGER_ENTRIES_SQL: &str = r"
CREATE TABLE ledger_entries (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    organization_id UUID NOT NULL,
    branch_id UUID NOT NULL,
    account_id UUID NOT NULL REFERENCES accounts(id),
    member_profile_id UUID REFERENCES member_profiles(id),
    member_joint_account_id UUID REFERENCES member_joint_accounts(id),
    transaction_id UUID REFERENCES transactions(id),
    loan_transaction_id UUID,
    source entry_source NOT NULL,
    debit DECIMAL(19, 4) NOT NULL DEFAULT 0,
    credit DECIMAL(19, 4) NOT NULL DEFAULT 0,
    entry_date DATE NOT NULL DEFAULT CURRENT_DATE,
    description TEXT,
    reference_number VARCHAR(100),
    bank_reference VARCHAR(100),
    payment_type_id UUID,
    proof_of_payment_media_id UUID,
    signature_media_id UUID,
    print_number BIGINT,
    reverses_entry_id UUID REFERENCES ledger_entries(id),
    created_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_debit_or_credit CHECK (
        (debit > 0 AND credit = 0) OR (debit = 0 AND credit > 0)
    ),
    CONSTRAINT chk_print_number_positive CHECK (print_number IS NULL OR print_number > 0)
);

-- An entry is reversed at most once
CREATE UNIQUE INDEX uq_ledger_entries_reversal
    ON ledger_entries(reverses_entry_id)
    WHERE reverses_entry_id IS NOT NULL;

-- Passbook lines are numbered per branch, account, and member
CREATE UNIQUE INDEX uq_ledger_entries_print_number
    ON ledger_entries(
        branch_id,
        account_id,
        COALESCE(member_profile_id, '00000000-0000-0000-0000-000000000000'::uuid),
        print_number
    )
    WHERE print_number IS NOT NULL;

CREATE INDEX idx_ledger_entries_balance
    ON ledger_entries(account_id, member_profile_id);
CREATE INDEX idx_ledger_entries_transaction ON ledger_entries(transaction_id)
    WHERE transaction_id IS NOT NULL;
CREATE INDEX idx_ledger_entries_loan ON ledger_entries(loan_transaction_id)
    WHERE loan_transaction_id IS NOT NULL;
CREATE INDEX idx_ledger_entries_date ON ledger_entries(organization_id, branch_id, entry_date);
";

const APPEND_ONLY_SQL: &str = r"
-- Entries are immutable once written. The only permitted update assigns a
-- print number to an entry that has none.
CREATE OR REPLACE FUNCTION prevent_ledger_entry_modification()
RETURNS TRIGGER AS $$
BEGIN
    IF TG_OP = 'DELETE' THEN
        RAISE EXCEPTION 'Cannot delete ledger entry %. Post a reversal instead.', OLD.id;
    END IF;

    IF OLD.print_number IS NULL
        AND NEW.print_number IS NOT NULL
        AND (to_jsonb(NEW) - 'print_number') = (to_jsonb(OLD) - 'print_number') THEN
        RETURN NEW;
    END IF;

    RAISE EXCEPTION 'Cannot modify ledger entry %. Post a reversal instead.', OLD.id;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_ledger_entries_append_only
BEFORE UPDATE OR DELETE ON ledger_entries
FOR EACH ROW
EXECUTE FUNCTION prevent_ledger_entry_modification();
";

const DROP_SQL: &str = r"
DROP TRIGGER IF EXISTS trg_ledger_entries_append_only ON ledger_entries;
DROP FUNCTION IF EXISTS prevent_ledger_entry_modification();
DROP TABLE IF EXISTS ledger_entries CASCADE;
DROP TABLE IF EXISTS transactions CASCADE;
DROP TABLE IF EXISTS transaction_batches CASCADE;
DROP TABLE IF EXISTS member_joint_accounts CASCADE;
DROP TABLE IF EXISTS member_profiles CASCADE;
DROP TABLE IF EXISTS accounts CASCADE;
DROP TYPE IF EXISTS entry_source;
";
