use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::{
    db_types::{Delivery, EscrowEntry, EscrowSnapshot, Order, SellerGroup},
    ledger_api::commission::CommissionError,
    traits::{
        data_objects::{FundingResult, PayoutContext, PayoutOutcome, PendingResult},
        LedgerError,
    },
};

#[derive(Debug, Clone, Error)]
pub enum EscrowError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Ledger error: {0}")]
    LedgerError(#[from] LedgerError),
    #[error("Commission error: {0}")]
    CommissionError(#[from] CommissionError),
    #[error("Order #{0} does not exist")]
    OrderNotFound(i64),
    #[error("Order #{0} has not been paid")]
    OrderNotPaid(i64),
    #[error("Order #{0} is cancelled")]
    OrderCancelled(i64),
    #[error("Could not queue the release job: {0}")]
    JobError(String),
}

impl From<sqlx::Error> for EscrowError {
    fn from(e: sqlx::Error) -> Self {
        EscrowError::DatabaseError(e.to_string())
    }
}

/// Escrow funding, release and refund.
///
/// The release and refund methods never return an error for an expected precondition failure. Those come back as
/// [`PayoutOutcome::Skipped`] so that batch workers can carry on with the next item.
#[allow(async_fn_in_trait)]
pub trait EscrowManagement {
    /// Records the buyer's payment as an escrow deposit into the treasury and marks the order paid.
    async fn fund_escrow_for_order(
        &self,
        order_id: i64,
        payment_reference: &str,
        ctx: &PayoutContext,
    ) -> Result<FundingResult, EscrowError>;

    /// Moves the order's earnings from committed to held-for-release, marks the order delivered, and queues the
    /// release job for `release_at`.
    async fn move_order_earnings_to_pending(
        &self,
        order_id: i64,
        confirmed_at: DateTime<Utc>,
        release_at: DateTime<Utc>,
    ) -> Result<PendingResult, EscrowError>;

    /// Releases all seller and rider proceeds for the order in one go.
    async fn release_order_payout(&self, order_id: i64, ctx: &PayoutContext) -> Result<PayoutOutcome, EscrowError>;

    /// Releases one seller group's proceeds.
    async fn release_seller_group_payout(
        &self,
        group_id: i64,
        ctx: &PayoutContext,
    ) -> Result<PayoutOutcome, EscrowError>;

    /// Releases the delivery fee to the rider.
    async fn release_rider_payout(&self, delivery_id: i64, ctx: &PayoutContext) -> Result<PayoutOutcome, EscrowError>;

    /// Cancels a seller group that never reached the hub and refunds the buyer for it.
    async fn refund_hub_timeout(&self, group_id: i64, ctx: &PayoutContext) -> Result<PayoutOutcome, EscrowError>;

    async fn fetch_escrow_entries_for_order(&self, order_id: i64) -> Result<Vec<EscrowEntry>, EscrowError>;

    /// Seller groups delivered on or before `delivered_before` whose payout is still pending.
    async fn fetch_releasable_seller_groups(
        &self,
        delivered_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SellerGroup>, EscrowError>;

    /// Deliveries completed on or before `delivered_before` whose rider payout is still pending.
    async fn fetch_releasable_deliveries(
        &self,
        delivered_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Delivery>, EscrowError>;

    /// Non-food seller groups that were expected at the hub before `expected_before` and have not arrived.
    async fn fetch_hub_timeout_candidates(
        &self,
        expected_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SellerGroup>, EscrowError>;

    /// Paid orders whose delivery is confirmed but whose escrow was never moved to pending.
    async fn fetch_unfinalized_delivered_orders(&self, limit: i64) -> Result<Vec<(Order, Delivery)>, EscrowError>;

    /// Writes the escrow totals for `date`. Returns `None` if a snapshot for that date already exists.
    async fn create_escrow_snapshot(
        &self,
        date: NaiveDate,
        treasury_user_id: i64,
    ) -> Result<Option<EscrowSnapshot>, EscrowError>;

    async fn fetch_escrow_snapshot(&self, date: NaiveDate) -> Result<Option<EscrowSnapshot>, EscrowError>;
}
