pub use super::accounts::Entity as Accounts;
pub use super::cash_counts::Entity as CashCounts;
pub use super::disbursement_transactions::Entity as DisbursementTransactions;
pub use super::ledger_entries::Entity as LedgerEntries;
pub use super::loan_transaction_entries::Entity as LoanTransactionEntries;
pub use super::loan_transactions::Entity as LoanTransactions;
pub use super::member_joint_accounts::Entity as MemberJointAccounts;
pub use super::member_profiles::Entity as MemberProfiles;
pub use super::transaction_batches::Entity as TransactionBatches;
pub use super::transactions::Entity as Transactions;
