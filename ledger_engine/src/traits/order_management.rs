use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{Delivery, Dispute, NewOrder, NewUser, Order, SellerGroup, User};

#[derive(Debug, Clone, Error)]
pub enum OrderManagementError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("User #{0} does not exist")]
    UserNotFound(i64),
    #[error("Order #{0} does not exist")]
    OrderNotFound(i64),
    #[error("Seller group #{0} does not exist")]
    GroupNotFound(i64),
    #[error("Dispute #{0} does not exist")]
    DisputeNotFound(i64),
    #[error("Invalid order: {0}")]
    InvalidOrder(String),
}

impl From<sqlx::Error> for OrderManagementError {
    fn from(e: sqlx::Error) -> Self {
        OrderManagementError::DatabaseError(e.to_string())
    }
}

/// The slice of the marketplace's users, orders, deliveries and disputes that the ledger depends on.
///
/// The storefront, checkout and delivery services own these records. They call these methods to keep the ledger's
/// view current; the ledger itself only reads them and moves their payout-related state.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    async fn create_user(&self, user: NewUser) -> Result<User, OrderManagementError>;

    async fn fetch_user(&self, user_id: i64) -> Result<Option<User>, OrderManagementError>;

    /// Sets (or clears) the external account that withdrawals are paid out to.
    async fn set_payout_account(&self, user_id: i64, account_id: Option<String>) -> Result<User, OrderManagementError>;

    /// Stores the order, its seller groups and its delivery record in one transaction.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderManagementError>;

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, OrderManagementError>;

    async fn seller_groups_for_order(&self, order_id: i64) -> Result<Vec<SellerGroup>, OrderManagementError>;

    async fn fetch_seller_group(&self, group_id: i64) -> Result<Option<SellerGroup>, OrderManagementError>;

    async fn delivery_for_order(&self, order_id: i64) -> Result<Option<Delivery>, OrderManagementError>;

    async fn assign_rider(&self, order_id: i64, rider_id: i64) -> Result<Delivery, OrderManagementError>;

    /// Records that the delivery reached the buyer, without touching the escrow. The stuck-order recovery worker
    /// picks these up.
    async fn mark_delivery_delivered(
        &self,
        order_id: i64,
        delivered_at: DateTime<Utc>,
    ) -> Result<Delivery, OrderManagementError>;

    async fn mark_group_shipped(&self, group_id: i64) -> Result<SellerGroup, OrderManagementError>;

    async fn mark_group_at_hub(
        &self,
        group_id: i64,
        arrived_at: DateTime<Utc>,
    ) -> Result<SellerGroup, OrderManagementError>;

    async fn open_dispute(&self, order_id: i64, reason: Option<String>) -> Result<Dispute, OrderManagementError>;

    async fn resolve_dispute(&self, dispute_id: i64) -> Result<Dispute, OrderManagementError>;
}
