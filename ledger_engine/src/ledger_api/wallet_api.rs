//! Read access to wallets and the journal, plus the drift-repair path.
use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{LedgerEntry, Usd, Wallet, WalletTransaction},
    traits::{DoubleEntryRequest, DoubleEntryResult, LedgerError, LedgerManagement, WalletAudit},
};

pub struct LedgerApi<B> {
    db: B,
}

impl<B: Debug> Debug for LedgerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerApi ({:?})", self.db)
    }
}

impl<B> LedgerApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> LedgerApi<B>
where B: LedgerManagement
{
    pub async fn wallet_for_user(&self, user_id: i64) -> Result<Wallet, LedgerError> {
        self.db.fetch_or_create_wallet(user_id).await
    }

    /// The cached available balance. This is what withdrawals and payouts check against.
    pub async fn balance(&self, wallet_id: i64) -> Result<Usd, LedgerError> {
        self.db.calculate_wallet_balance(wallet_id).await
    }

    /// Earnings that are held in escrow for the user and not yet releasable.
    pub async fn pending(&self, user_id: i64) -> Result<Usd, LedgerError> {
        self.db.calculate_wallet_pending(user_id).await
    }

    /// Records a balanced movement between two parties. Replaying the same reference is a no-op.
    pub async fn transfer(&self, request: DoubleEntryRequest) -> Result<DoubleEntryResult, LedgerError> {
        self.db.create_double_entry(request).await
    }

    /// Compares the cached figures on the wallet against the journal and the escrow ledger.
    pub async fn audit(&self, wallet_id: i64) -> Result<WalletAudit, LedgerError> {
        let audit = self.db.audit_wallet(wallet_id).await?;
        if !audit.is_consistent() {
            warn!(
                "🗃️ Wallet #{wallet_id} has drifted. Cached balance {} vs ledger {}. Cached pending {} vs held {}",
                audit.cached_balance, audit.ledger_balance, audit.cached_pending, audit.held_earnings
            );
        }
        Ok(audit)
    }

    /// Overwrites the cached balance with the one derived from the journal.
    pub async fn repair(&self, wallet_id: i64) -> Result<Wallet, LedgerError> {
        let before = self.db.calculate_wallet_balance(wallet_id).await?;
        let wallet = self.db.recalculate_wallet_from_ledger(wallet_id).await?;
        if before != wallet.balance {
            warn!("🗃️ Wallet #{wallet_id} balance repaired from {before} to {}", wallet.balance);
        }
        Ok(wallet)
    }

    pub async fn entries_for_wallet(&self, wallet_id: i64) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.db.fetch_ledger_entries_for_wallet(wallet_id).await
    }

    pub async fn entries_for_order(&self, order_id: i64) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.db.fetch_ledger_entries_for_order(order_id).await
    }

    pub async fn history(&self, wallet_id: i64) -> Result<Vec<WalletTransaction>, LedgerError> {
        self.db.fetch_transactions_for_wallet(wallet_id).await
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
