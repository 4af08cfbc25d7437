//! A small marketplace to run the escrow flows against.
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    db_types::{NewOrder, NewSellerGroup, NewUser, Order, StoreType, Usd, UserRole},
    ledger_api::{commission::CommissionRates, escrow_flow_api::EscrowFlowApi, policy::PayoutPolicy},
    traits::{EscrowManagement, OrderManagement},
    SqliteDatabase,
};

/// 10% for general stores, 15% for food.
pub fn test_rates() -> CommissionRates {
    CommissionRates::new(Decimal::new(10, 2), Decimal::new(15, 2)).expect("valid rates")
}

#[derive(Debug, Clone, Copy)]
pub struct Marketplace {
    pub treasury: i64,
    pub buyer: i64,
    pub general_seller: i64,
    pub food_seller: i64,
    pub rider: i64,
}

/// Creates the treasury, a buyer, a seller of each store type and a rider. Sellers and rider have payout accounts.
pub async fn seed_marketplace(db: &SqliteDatabase) -> Marketplace {
    let treasury = create(db, NewUser::new("Platform escrow", UserRole::Platform)).await;
    let buyer = create(db, NewUser::new("Alice", UserRole::Buyer)).await;
    let general_seller =
        create(db, NewUser::new("Hardware Hut", UserRole::Seller).with_stripe_account("acct_general")).await;
    let food_seller = create(db, NewUser::new("Noodle Bar", UserRole::Seller).with_stripe_account("acct_food")).await;
    let rider = create(db, NewUser::new("Bob", UserRole::Rider).with_stripe_account("acct_rider")).await;
    Marketplace { treasury, buyer, general_seller, food_seller, rider }
}

async fn create(db: &SqliteDatabase, user: NewUser) -> i64 {
    db.create_user(user).await.expect("Error creating user").id
}

pub fn escrow_api(db: &SqliteDatabase, market: &Marketplace) -> EscrowFlowApi<SqliteDatabase> {
    EscrowFlowApi::new(db.clone(), market.treasury, test_rates(), PayoutPolicy::default())
}

/// Inserts an order with one seller group per `(seller, store type, subtotal)` and a rider assigned.
pub async fn create_order(
    db: &SqliteDatabase,
    market: &Marketplace,
    groups: &[(i64, StoreType, Usd)],
    delivery_fee: Usd,
) -> Order {
    let order = groups.iter().fold(NewOrder::new(market.buyer, delivery_fee), |order, (seller, store, subtotal)| {
        order.with_group(NewSellerGroup::new(*seller, *store, *subtotal))
    });
    let order = db.insert_order(order).await.expect("Error inserting order");
    db.assign_rider(order.id, market.rider).await.expect("Error assigning rider");
    order
}

/// An order that is paid for, so its funds are in escrow.
pub async fn create_paid_order(
    db: &SqliteDatabase,
    market: &Marketplace,
    groups: &[(i64, StoreType, Usd)],
    delivery_fee: Usd,
) -> Order {
    let order = create_order(db, market, groups, delivery_fee).await;
    let ctx = escrow_api(db, market).context(Utc::now());
    db.fund_escrow_for_order(order.id, &format!("pi_{}", order.id), &ctx).await.expect("Error funding escrow");
    order
}

/// An order that is paid for and delivered at `delivered_at`, with its earnings pending release.
pub async fn create_delivered_order(
    db: &SqliteDatabase,
    market: &Marketplace,
    groups: &[(i64, StoreType, Usd)],
    delivery_fee: Usd,
    delivered_at: DateTime<Utc>,
) -> Order {
    let order = create_paid_order(db, market, groups, delivery_fee).await;
    db.mark_delivery_delivered(order.id, delivered_at).await.expect("Error confirming delivery");
    escrow_api(db, market)
        .move_order_earnings_to_pending(order.id, delivered_at)
        .await
        .expect("Error moving earnings to pending");
    order
}
