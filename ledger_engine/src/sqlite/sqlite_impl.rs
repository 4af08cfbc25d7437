//! `SqliteDatabase` is a concrete implementation of a ledger engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module. Every method that changes state runs in its own transaction, built from the functions in [`super::db`].
use std::fmt::Debug;

use chrono::{DateTime, NaiveDate, Utc};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool, Transaction};

use super::db::{
    cron_locks,
    db_url,
    escrow,
    jobs,
    ledger,
    new_pool,
    orders,
    payouts,
    snapshots,
    transactions,
    users,
    wallets,
    withdrawals,
};
use crate::{
    db_types::{
        Delivery,
        Dispute,
        EscrowEntry,
        EscrowSnapshot,
        Job,
        JobStatus,
        LedgerEntry,
        NewOrder,
        NewUser,
        NewWithdrawal,
        Order,
        SellerGroup,
        Usd,
        User,
        Wallet,
        WalletTransaction,
        Withdrawal,
    },
    ledger_api::{jobs::JobPayload, transfer::TransferReceipt},
    traits::{
        DoubleEntryRequest,
        DoubleEntryResult,
        EscrowError,
        EscrowManagement,
        FundingResult,
        InsertResult,
        JobError,
        JobManagement,
        LedgerError,
        LedgerManagement,
        OrderManagement,
        OrderManagementError,
        PayoutContext,
        PayoutOutcome,
        PendingResult,
        WalletAudit,
        WithdrawalError,
        WithdrawalManagement,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

/// Claims are undone along with everything else when a release is skipped.
async fn commit_if_released(tx: Transaction<'_, Sqlite>, outcome: &PayoutOutcome) -> Result<(), sqlx::Error> {
    match outcome {
        PayoutOutcome::Released(_) => tx.commit().await,
        PayoutOutcome::Skipped(reason) => {
            trace!("🗃️ Rolling back skipped release ({reason})");
            tx.rollback().await
        },
    }
}

impl LedgerManagement for SqliteDatabase {
    async fn fetch_or_create_wallet(&self, user_id: i64) -> Result<Wallet, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let wallet = wallets::fetch_or_create_wallet(user_id, &mut conn).await?;
        Ok(wallet)
    }

    async fn fetch_wallet(&self, wallet_id: i64) -> Result<Option<Wallet>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let wallet = wallets::fetch_wallet(wallet_id, &mut conn).await?;
        Ok(wallet)
    }

    async fn fetch_wallet_for_user(&self, user_id: i64) -> Result<Option<Wallet>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let wallet = wallets::fetch_wallet_for_user(user_id, &mut conn).await?;
        Ok(wallet)
    }

    async fn calculate_wallet_balance(&self, wallet_id: i64) -> Result<Usd, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let wallet = wallets::fetch_wallet(wallet_id, &mut conn)
            .await?
            .ok_or_else(|| LedgerError::WalletNotFound(format!("wallet #{wallet_id}")))?;
        Ok(wallet.balance)
    }

    async fn calculate_ledger_balance(&self, wallet_id: i64) -> Result<Usd, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let balance = wallets::ledger_balance(wallet_id, &mut conn).await?;
        Ok(balance)
    }

    async fn calculate_wallet_pending(&self, user_id: i64) -> Result<Usd, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let pending = wallets::held_earnings(user_id, &mut conn).await?;
        Ok(pending)
    }

    async fn recalculate_wallet_from_ledger(&self, wallet_id: i64) -> Result<Wallet, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let wallet = ledger::recalculate_wallet(wallet_id, &mut tx).await?;
        tx.commit().await?;
        Ok(wallet)
    }

    async fn audit_wallet(&self, wallet_id: i64) -> Result<WalletAudit, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let wallet = wallets::fetch_wallet(wallet_id, &mut conn)
            .await?
            .ok_or_else(|| LedgerError::WalletNotFound(format!("wallet #{wallet_id}")))?;
        let ledger_balance = wallets::ledger_balance(wallet_id, &mut conn).await?;
        let held_earnings = wallets::held_earnings(wallet.user_id, &mut conn).await?;
        Ok(WalletAudit {
            wallet_id,
            cached_balance: wallet.balance,
            ledger_balance,
            cached_pending: wallet.pending,
            held_earnings,
        })
    }

    async fn create_double_entry(&self, request: DoubleEntryRequest) -> Result<DoubleEntryResult, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let result = ledger::create_double_entry(&request, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_ledger_entry(&self, reference: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let entry = ledger::fetch_entry(reference, &mut conn).await?;
        Ok(entry)
    }

    async fn fetch_ledger_entries_for_wallet(&self, wallet_id: i64) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let entries = ledger::fetch_entries_for_wallet(wallet_id, &mut conn).await?;
        Ok(entries)
    }

    async fn fetch_ledger_entries_for_order(&self, order_id: i64) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let entries = ledger::fetch_entries_for_order(order_id, &mut conn).await?;
        Ok(entries)
    }

    async fn fetch_transactions_for_wallet(&self, wallet_id: i64) -> Result<Vec<WalletTransaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let txs = transactions::fetch_for_wallet(wallet_id, &mut conn).await?;
        Ok(txs)
    }

    async fn fetch_transactions_for_order(&self, order_id: i64) -> Result<Vec<WalletTransaction>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let txs = transactions::fetch_for_order(order_id, &mut conn).await?;
        Ok(txs)
    }
}

impl OrderManagement for SqliteDatabase {
    async fn create_user(&self, user: NewUser) -> Result<User, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let user = users::create_user(user, &mut conn).await?;
        debug!("🗃️ User #{} ({}) created", user.id, user.role);
        Ok(user)
    }

    async fn fetch_user(&self, user_id: i64) -> Result<Option<User>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let user = users::fetch_user(user_id, &mut conn).await?;
        Ok(user)
    }

    async fn set_payout_account(&self, user_id: i64, account_id: Option<String>) -> Result<User, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        users::set_payout_account(user_id, account_id, &mut conn)
            .await?
            .ok_or(OrderManagementError::UserNotFound(user_id))
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderManagementError> {
        if order.seller_groups.is_empty() {
            return Err(OrderManagementError::InvalidOrder("an order needs at least one seller group".into()));
        }
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn seller_groups_for_order(&self, order_id: i64) -> Result<Vec<SellerGroup>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let groups = orders::fetch_groups_for_order(order_id, &mut conn).await?;
        Ok(groups)
    }

    async fn fetch_seller_group(&self, group_id: i64) -> Result<Option<SellerGroup>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let group = orders::fetch_group(group_id, &mut conn).await?;
        Ok(group)
    }

    async fn delivery_for_order(&self, order_id: i64) -> Result<Option<Delivery>, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        let delivery = orders::fetch_delivery_for_order(order_id, &mut conn).await?;
        Ok(delivery)
    }

    async fn assign_rider(&self, order_id: i64, rider_id: i64) -> Result<Delivery, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        orders::assign_rider(order_id, rider_id, &mut conn).await?.ok_or(OrderManagementError::OrderNotFound(order_id))
    }

    async fn mark_delivery_delivered(
        &self,
        order_id: i64,
        delivered_at: DateTime<Utc>,
    ) -> Result<Delivery, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        orders::mark_delivery_delivered(order_id, delivered_at, &mut conn)
            .await?
            .ok_or(OrderManagementError::OrderNotFound(order_id))
    }

    async fn mark_group_shipped(&self, group_id: i64) -> Result<SellerGroup, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        orders::mark_group_shipped(group_id, &mut conn).await?.ok_or(OrderManagementError::GroupNotFound(group_id))
    }

    async fn mark_group_at_hub(
        &self,
        group_id: i64,
        arrived_at: DateTime<Utc>,
    ) -> Result<SellerGroup, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        orders::mark_group_at_hub(group_id, arrived_at, &mut conn)
            .await?
            .ok_or(OrderManagementError::GroupNotFound(group_id))
    }

    async fn open_dispute(&self, order_id: i64, reason: Option<String>) -> Result<Dispute, OrderManagementError> {
        let mut tx = self.pool.begin().await?;
        if orders::fetch_order(order_id, &mut tx).await?.is_none() {
            return Err(OrderManagementError::OrderNotFound(order_id));
        }
        let dispute = orders::open_dispute(order_id, reason, &mut tx).await?;
        tx.commit().await?;
        info!("🗃️ Dispute #{} opened on order #{order_id}", dispute.id);
        Ok(dispute)
    }

    async fn resolve_dispute(&self, dispute_id: i64) -> Result<Dispute, OrderManagementError> {
        let mut conn = self.pool.acquire().await?;
        orders::resolve_dispute(dispute_id, &mut conn).await?.ok_or(OrderManagementError::DisputeNotFound(dispute_id))
    }
}

impl EscrowManagement for SqliteDatabase {
    async fn fund_escrow_for_order(
        &self,
        order_id: i64,
        payment_reference: &str,
        ctx: &PayoutContext,
    ) -> Result<FundingResult, EscrowError> {
        let mut tx = self.pool.begin().await?;
        let result = payouts::fund_escrow(order_id, payment_reference, ctx, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn move_order_earnings_to_pending(
        &self,
        order_id: i64,
        confirmed_at: DateTime<Utc>,
        release_at: DateTime<Utc>,
    ) -> Result<PendingResult, EscrowError> {
        let mut tx = self.pool.begin().await?;
        let result = payouts::move_to_pending(order_id, confirmed_at, release_at, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn release_order_payout(&self, order_id: i64, ctx: &PayoutContext) -> Result<PayoutOutcome, EscrowError> {
        let mut tx = self.pool.begin().await?;
        let outcome = payouts::release_order(order_id, ctx, &mut tx).await?;
        commit_if_released(tx, &outcome).await?;
        Ok(outcome)
    }

    async fn release_seller_group_payout(
        &self,
        group_id: i64,
        ctx: &PayoutContext,
    ) -> Result<PayoutOutcome, EscrowError> {
        let mut tx = self.pool.begin().await?;
        let outcome = payouts::release_group(group_id, ctx, &mut tx).await?;
        commit_if_released(tx, &outcome).await?;
        Ok(outcome)
    }

    async fn release_rider_payout(&self, delivery_id: i64, ctx: &PayoutContext) -> Result<PayoutOutcome, EscrowError> {
        let mut tx = self.pool.begin().await?;
        let outcome = payouts::release_rider(delivery_id, ctx, &mut tx).await?;
        commit_if_released(tx, &outcome).await?;
        Ok(outcome)
    }

    async fn refund_hub_timeout(&self, group_id: i64, ctx: &PayoutContext) -> Result<PayoutOutcome, EscrowError> {
        let mut tx = self.pool.begin().await?;
        let outcome = payouts::refund_hub_timeout(group_id, ctx, &mut tx).await?;
        commit_if_released(tx, &outcome).await?;
        Ok(outcome)
    }

    async fn fetch_escrow_entries_for_order(&self, order_id: i64) -> Result<Vec<EscrowEntry>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let entries = escrow::fetch_entries_for_order(order_id, &mut conn).await?;
        Ok(entries)
    }

    async fn fetch_releasable_seller_groups(
        &self,
        delivered_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SellerGroup>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let groups = orders::fetch_releasable_groups(delivered_before, limit, &mut conn).await?;
        Ok(groups)
    }

    async fn fetch_releasable_deliveries(
        &self,
        delivered_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Delivery>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let deliveries = orders::fetch_releasable_deliveries(delivered_before, limit, &mut conn).await?;
        Ok(deliveries)
    }

    async fn fetch_hub_timeout_candidates(
        &self,
        expected_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SellerGroup>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let groups = orders::fetch_hub_timeout_candidates(expected_before, limit, &mut conn).await?;
        Ok(groups)
    }

    async fn fetch_unfinalized_delivered_orders(&self, limit: i64) -> Result<Vec<(Order, Delivery)>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_unfinalized_delivered_orders(limit, &mut conn).await?;
        Ok(orders)
    }

    async fn create_escrow_snapshot(
        &self,
        date: NaiveDate,
        treasury_user_id: i64,
    ) -> Result<Option<EscrowSnapshot>, EscrowError> {
        let mut tx = self.pool.begin().await?;
        let snapshot = snapshots::create_snapshot(date, treasury_user_id, &mut tx).await?;
        tx.commit().await?;
        Ok(snapshot)
    }

    async fn fetch_escrow_snapshot(&self, date: NaiveDate) -> Result<Option<EscrowSnapshot>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let snapshot = snapshots::fetch_snapshot(date, &mut conn).await?;
        Ok(snapshot)
    }
}

impl WithdrawalManagement for SqliteDatabase {
    async fn create_withdrawal(
        &self,
        request: NewWithdrawal,
        treasury_user_id: i64,
    ) -> Result<Withdrawal, WithdrawalError> {
        let mut tx = self.pool.begin().await?;
        let withdrawal = withdrawals::create_withdrawal(request, treasury_user_id, &mut tx).await?;
        tx.commit().await?;
        Ok(withdrawal)
    }

    async fn fetch_withdrawal(&self, id: i64) -> Result<Option<Withdrawal>, WithdrawalError> {
        let mut conn = self.pool.acquire().await?;
        let withdrawal = withdrawals::fetch_withdrawal(id, &mut conn).await?;
        Ok(withdrawal)
    }

    async fn fetch_withdrawals_for_user(&self, user_id: i64) -> Result<Vec<Withdrawal>, WithdrawalError> {
        let mut conn = self.pool.acquire().await?;
        let withdrawals = withdrawals::fetch_withdrawals_for_user(user_id, &mut conn).await?;
        Ok(withdrawals)
    }

    async fn mark_withdrawal_processing(&self, id: i64, now: DateTime<Utc>) -> Result<Withdrawal, WithdrawalError> {
        let mut conn = self.pool.acquire().await?;
        withdrawals::mark_processing(id, now, &mut conn).await
    }

    async fn complete_withdrawal(
        &self,
        id: i64,
        receipt: &TransferReceipt,
        treasury_user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Withdrawal, WithdrawalError> {
        let mut tx = self.pool.begin().await?;
        let withdrawal = withdrawals::complete_withdrawal(id, receipt, treasury_user_id, now, &mut tx).await?;
        tx.commit().await?;
        Ok(withdrawal)
    }

    async fn reject_withdrawal(
        &self,
        id: i64,
        reason: &str,
        treasury_user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Withdrawal, WithdrawalError> {
        let mut tx = self.pool.begin().await?;
        let withdrawal = withdrawals::reject_withdrawal(id, reason, false, treasury_user_id, now, &mut tx).await?;
        tx.commit().await?;
        Ok(withdrawal)
    }

    async fn fail_withdrawal(
        &self,
        id: i64,
        reason: &str,
        treasury_user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Withdrawal, WithdrawalError> {
        let mut tx = self.pool.begin().await?;
        let withdrawal = withdrawals::reject_withdrawal(id, reason, true, treasury_user_id, now, &mut tx).await?;
        tx.commit().await?;
        Ok(withdrawal)
    }
}

impl JobManagement for SqliteDatabase {
    async fn enqueue_job(
        &self,
        payload: &JobPayload,
        run_at: DateTime<Utc>,
        max_retries: i64,
        now: DateTime<Utc>,
    ) -> Result<InsertResult<Job>, JobError> {
        let mut conn = self.pool.acquire().await?;
        jobs::insert_job(payload, run_at, max_retries, now, &mut conn).await
    }

    async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Job>, JobError> {
        let mut conn = self.pool.acquire().await?;
        let jobs = jobs::claim_due_jobs(now, stale_before, limit, &mut conn).await?;
        Ok(jobs)
    }

    async fn finish_job(
        &self,
        id: i64,
        status: JobStatus,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Job, JobError> {
        let mut conn = self.pool.acquire().await?;
        jobs::finish_job(id, status, error, now, &mut conn).await?.ok_or(JobError::JobNotFound(id))
    }

    async fn retry_job(
        &self,
        id: i64,
        error: &str,
        retry_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Job, JobError> {
        let mut conn = self.pool.acquire().await?;
        jobs::retry_job(id, error, retry_at, now, &mut conn).await?.ok_or(JobError::JobNotFound(id))
    }

    async fn fetch_job_by_dedupe_key(&self, key: &str) -> Result<Option<Job>, JobError> {
        let mut conn = self.pool.acquire().await?;
        let job = jobs::fetch_job_by_dedupe_key(key, &mut conn).await?;
        Ok(job)
    }

    async fn acquire_cron_lock(
        &self,
        name: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, JobError> {
        let mut conn = self.pool.acquire().await?;
        let acquired = cron_locks::acquire(name, now, stale_before, &mut conn).await?;
        Ok(acquired)
    }

    async fn release_cron_lock(&self, name: &str) -> Result<(), JobError> {
        let mut conn = self.pool.acquire().await?;
        cron_locks::release(name, &mut conn).await?;
        Ok(())
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Applies the embedded migrations that have not run yet.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations are up to date");
        Ok(())
    }

    pub async fn create_database_if_not_exist(url: &str) -> Result<(), sqlx::Error> {
        if !Sqlite::database_exists(url).await? {
            info!("🗃️ Creating database at {url}");
            Sqlite::create_database(url).await?;
        }
        Ok(())
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
