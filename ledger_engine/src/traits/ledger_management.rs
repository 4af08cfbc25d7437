use thiserror::Error;

use crate::{
    db_types::{LedgerEntry, Usd, Wallet, WalletTransaction},
    traits::data_objects::{DoubleEntryRequest, DoubleEntryResult, WalletAudit},
};

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Ledger amounts must be greater than zero. Got {0}")]
    InvalidAmount(Usd),
    #[error("Wallet #{wallet_id} has {balance} available, but {required} is required")]
    InsufficientFunds { wallet_id: i64, balance: Usd, required: Usd },
    #[error("No wallet exists for {0}")]
    WalletNotFound(String),
    #[error("Ledger entry {0} is missing after it was written")]
    MissingEntry(String),
    /// A debit and credit pair disagree. This means the journal is corrupt and must never be silently ignored.
    #[error("Ledger imbalance for {reference}. Debit: {debit}, Credit: {credit}")]
    Imbalance { reference: String, debit: Usd, credit: Usd },
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}

/// Wallet and journal access.
///
/// Backends apply every double-entry movement atomically, and only ever change a cached wallet balance for ledger
/// entries they have just created.
#[allow(async_fn_in_trait)]
pub trait LedgerManagement {
    /// Fetches the user's wallet, creating an empty one if the user does not have one yet.
    async fn fetch_or_create_wallet(&self, user_id: i64) -> Result<Wallet, LedgerError>;

    async fn fetch_wallet(&self, wallet_id: i64) -> Result<Option<Wallet>, LedgerError>;

    async fn fetch_wallet_for_user(&self, user_id: i64) -> Result<Option<Wallet>, LedgerError>;

    /// The cached available balance for the wallet.
    async fn calculate_wallet_balance(&self, wallet_id: i64) -> Result<Usd, LedgerError>;

    /// The sum of CREDIT minus DEBIT entries for the wallet. Does not touch the cache.
    async fn calculate_ledger_balance(&self, wallet_id: i64) -> Result<Usd, LedgerError>;

    /// The sum of the user's HELD seller and rider earnings.
    async fn calculate_wallet_pending(&self, user_id: i64) -> Result<Usd, LedgerError>;

    /// Overwrites the cached balance with the ledger-derived one. A repair path for drift; never needed in normal
    /// operation.
    async fn recalculate_wallet_from_ledger(&self, wallet_id: i64) -> Result<Wallet, LedgerError>;

    async fn audit_wallet(&self, wallet_id: i64) -> Result<WalletAudit, LedgerError>;

    /// Writes a balanced debit/credit pair and applies it to the cached balances, in one transaction.
    async fn create_double_entry(&self, request: DoubleEntryRequest) -> Result<DoubleEntryResult, LedgerError>;

    async fn fetch_ledger_entry(&self, reference: &str) -> Result<Option<LedgerEntry>, LedgerError>;

    async fn fetch_ledger_entries_for_wallet(&self, wallet_id: i64) -> Result<Vec<LedgerEntry>, LedgerError>;

    async fn fetch_ledger_entries_for_order(&self, order_id: i64) -> Result<Vec<LedgerEntry>, LedgerError>;

    async fn fetch_transactions_for_wallet(&self, wallet_id: i64) -> Result<Vec<WalletTransaction>, LedgerError>;

    async fn fetch_transactions_for_order(&self, order_id: i64) -> Result<Vec<WalletTransaction>, LedgerError>;
}
