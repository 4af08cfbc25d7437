//! Orders, seller groups, deliveries and disputes.
//!
//! The `claim_*` functions are compare-and-swap updates: they return `true` only for the one caller that moved the
//! row out of its unclaimed state.
use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::db_types::{Delivery, Dispute, NewOrder, Order, SellerGroup, Usd};

pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, sqlx::Error> {
    let total = order.total_amount();
    let inserted: Order =
        sqlx::query_as("INSERT INTO orders (buyer_id, total_amount, delivery_fee) VALUES (?, ?, ?) RETURNING *")
            .bind(order.buyer_id)
            .bind(total)
            .bind(order.delivery_fee)
            .fetch_one(&mut *conn)
            .await?;
    for group in order.seller_groups {
        sqlx::query(
            r#"INSERT INTO seller_groups (order_id, seller_id, store_type, subtotal, expected_at_hub)
            VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(inserted.id)
        .bind(group.seller_id)
        .bind(group.store_type)
        .bind(group.subtotal)
        .bind(group.expected_at_hub)
        .execute(&mut *conn)
        .await?;
    }
    sqlx::query("INSERT INTO deliveries (order_id, delivery_fee) VALUES (?, ?)")
        .bind(inserted.id)
        .bind(order.delivery_fee)
        .execute(conn)
        .await?;
    debug!("🗃️ Order #{} saved with a total of {total}", inserted.id);
    Ok(inserted)
}

pub async fn fetch_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = ?").bind(order_id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_groups_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<SellerGroup>, sqlx::Error> {
    let groups = sqlx::query_as("SELECT * FROM seller_groups WHERE order_id = ? ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(groups)
}

pub async fn fetch_group(group_id: i64, conn: &mut SqliteConnection) -> Result<Option<SellerGroup>, sqlx::Error> {
    let group =
        sqlx::query_as("SELECT * FROM seller_groups WHERE id = ?").bind(group_id).fetch_optional(conn).await?;
    Ok(group)
}

pub async fn fetch_delivery_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Delivery>, sqlx::Error> {
    let delivery =
        sqlx::query_as("SELECT * FROM deliveries WHERE order_id = ?").bind(order_id).fetch_optional(conn).await?;
    Ok(delivery)
}

pub async fn fetch_delivery(delivery_id: i64, conn: &mut SqliteConnection) -> Result<Option<Delivery>, sqlx::Error> {
    let delivery =
        sqlx::query_as("SELECT * FROM deliveries WHERE id = ?").bind(delivery_id).fetch_optional(conn).await?;
    Ok(delivery)
}

pub async fn assign_rider(
    order_id: i64,
    rider_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Delivery>, sqlx::Error> {
    let delivery = sqlx::query_as(
        r#"UPDATE deliveries SET rider_id = ?,
            status = CASE status WHEN 'PENDING' THEN 'ASSIGNED' ELSE status END,
            updated_at = CURRENT_TIMESTAMP
        WHERE order_id = ? RETURNING *"#,
    )
    .bind(rider_id)
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    Ok(delivery)
}

/// Marks the order's delivery as delivered. The first confirmation time sticks.
pub async fn mark_delivery_delivered(
    order_id: i64,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Delivery>, sqlx::Error> {
    let delivery = sqlx::query_as(
        r#"UPDATE deliveries SET status = 'DELIVERED', delivered_at = COALESCE(delivered_at, ?),
            updated_at = CURRENT_TIMESTAMP
        WHERE order_id = ? RETURNING *"#,
    )
    .bind(at)
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    Ok(delivery)
}

pub async fn mark_group_shipped(
    group_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<SellerGroup>, sqlx::Error> {
    sqlx::query(
        r#"UPDATE seller_groups SET status = 'SHIPPED', updated_at = CURRENT_TIMESTAMP
        WHERE id = ? AND status = 'PENDING'"#,
    )
    .bind(group_id)
    .execute(&mut *conn)
    .await?;
    fetch_group(group_id, conn).await
}

pub async fn mark_group_at_hub(
    group_id: i64,
    arrived_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<SellerGroup>, sqlx::Error> {
    sqlx::query(
        r#"UPDATE seller_groups SET status = 'AT_HUB', arrived_at_hub = COALESCE(arrived_at_hub, ?),
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ? AND status IN ('PENDING', 'SHIPPED')"#,
    )
    .bind(arrived_at)
    .bind(group_id)
    .execute(&mut *conn)
    .await?;
    fetch_group(group_id, conn).await
}

//--------------------------------------       Disputes        ---------------------------------------------------------

pub async fn open_dispute(
    order_id: i64,
    reason: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<Dispute, sqlx::Error> {
    let dispute = sqlx::query_as("INSERT INTO disputes (order_id, reason) VALUES (?, ?) RETURNING *")
        .bind(order_id)
        .bind(reason)
        .fetch_one(conn)
        .await?;
    Ok(dispute)
}

pub async fn resolve_dispute(dispute_id: i64, conn: &mut SqliteConnection) -> Result<Option<Dispute>, sqlx::Error> {
    let dispute = sqlx::query_as(
        "UPDATE disputes SET status = 'RESOLVED', updated_at = CURRENT_TIMESTAMP WHERE id = ? RETURNING *",
    )
    .bind(dispute_id)
    .fetch_optional(conn)
    .await?;
    Ok(dispute)
}

pub async fn has_active_dispute(order_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM disputes WHERE order_id = ? AND status IN ('OPEN', 'UNDER_REVIEW')",
    )
    .bind(order_id)
    .fetch_one(conn)
    .await?;
    Ok(count > 0)
}

//--------------------------------------    Escrow lifecycle   ---------------------------------------------------------

/// Marks the order paid and returns it. This is a write, so it can open a funding transaction.
pub async fn mark_order_paid(
    order_id: i64,
    payment_reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"UPDATE orders SET is_paid = 1,
            status = CASE status WHEN 'PENDING' THEN 'PAID' ELSE status END,
            payment_reference = COALESCE(payment_reference, ?),
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ? RETURNING *"#,
    )
    .bind(payment_reference)
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Marks the order and its live seller groups delivered. Completed and cancelled orders keep their status.
pub async fn mark_order_delivered(
    order_id: i64,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE orders
        SET status = 'DELIVERED', delivered_at = COALESCE(delivered_at, ?), updated_at = CURRENT_TIMESTAMP
        WHERE id = ? AND status NOT IN ('COMPLETED', 'CANCELLED')"#,
    )
    .bind(at)
    .bind(order_id)
    .execute(&mut *conn)
    .await?;
    sqlx::query(
        r#"UPDATE seller_groups SET status = 'DELIVERED', delivered_at = COALESCE(delivered_at, ?),
            updated_at = CURRENT_TIMESTAMP
        WHERE order_id = ? AND status != 'CANCELLED'"#,
    )
    .bind(at)
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Flips `payout_released` for the order. Only one caller can ever win this.
pub async fn claim_order_release(order_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE orders SET payout_released = 1, updated_at = CURRENT_TIMESTAMP WHERE id = ? AND payout_released = 0",
    )
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn claim_group_payout(group_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE seller_groups SET payout_status = 'PROCESSING', updated_at = CURRENT_TIMESTAMP
        WHERE id = ? AND payout_status = 'PENDING'"#,
    )
    .bind(group_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn claim_rider_payout(delivery_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE deliveries SET rider_payout_status = 'PROCESSING', updated_at = CURRENT_TIMESTAMP
        WHERE id = ? AND rider_payout_status = 'PENDING'"#,
    )
    .bind(delivery_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Claims a seller group for a hub-timeout refund by cancelling it. Only general-store groups that are still on
/// their way to the hub and have not been paid out qualify.
pub async fn claim_group_for_hub_timeout(group_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE seller_groups SET status = 'CANCELLED', payout_status = 'CANCELLED', updated_at = CURRENT_TIMESTAMP
        WHERE id = ? AND store_type = 'GENERAL' AND status IN ('PENDING', 'SHIPPED')
            AND arrived_at_hub IS NULL AND payout_status = 'PENDING'"#,
    )
    .bind(group_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn complete_group_payout(
    group_id: i64,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE seller_groups SET payout_status = 'COMPLETED', payout_released_at = ?, updated_at = CURRENT_TIMESTAMP
        WHERE id = ?"#,
    )
    .bind(at)
    .bind(group_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Marks every live seller group of the order as paid out.
pub async fn complete_order_groups(
    order_id: i64,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE seller_groups SET payout_status = 'COMPLETED', payout_released_at = ?, updated_at = CURRENT_TIMESTAMP
        WHERE order_id = ? AND payout_status NOT IN ('COMPLETED', 'CANCELLED')"#,
    )
    .bind(at)
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn complete_rider_payout(delivery_id: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE deliveries SET rider_payout_status = 'COMPLETED', updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(delivery_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn complete_order(order_id: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE orders SET status = 'COMPLETED', payout_released = 1, updated_at = CURRENT_TIMESTAMP
        WHERE id = ?"#,
    )
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Sets the order's `payout_released` flag if every live seller group has been paid out. Returns true if the flag
/// was flipped by this call.
pub async fn release_order_if_groups_paid(order_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE orders SET payout_released = 1, updated_at = CURRENT_TIMESTAMP
        WHERE id = ? AND payout_released = 0
            AND EXISTS (SELECT 1 FROM seller_groups WHERE order_id = orders.id AND status != 'CANCELLED')
            AND NOT EXISTS (
                SELECT 1 FROM seller_groups
                WHERE order_id = orders.id AND status != 'CANCELLED' AND payout_status != 'COMPLETED'
            )"#,
    )
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn reduce_order_total(
    order_id: i64,
    amount: Usd,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"UPDATE orders SET total_amount = MAX(total_amount - ?, 0), updated_at = CURRENT_TIMESTAMP
        WHERE id = ? RETURNING *"#,
    )
    .bind(amount)
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

pub async fn count_live_groups(order_id: i64, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM seller_groups WHERE order_id = ? AND status != 'CANCELLED'")
        .bind(order_id)
        .fetch_one(conn)
        .await?;
    Ok(count)
}

/// Cancels the order outright: nothing is owed any more, and nobody will be paid for it.
pub async fn cancel_order(order_id: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE orders SET status = 'CANCELLED', total_amount = 0, updated_at = CURRENT_TIMESTAMP
        WHERE id = ?"#,
    )
    .bind(order_id)
    .execute(&mut *conn)
    .await?;
    sqlx::query(
        r#"UPDATE deliveries SET rider_payout_status = 'CANCELLED', updated_at = CURRENT_TIMESTAMP
        WHERE order_id = ? AND rider_payout_status = 'PENDING'"#,
    )
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(())
}

//--------------------------------------     Worker queries    ---------------------------------------------------------

pub async fn fetch_releasable_groups(
    delivered_before: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<SellerGroup>, sqlx::Error> {
    let groups = sqlx::query_as(
        r#"SELECT * FROM seller_groups
        WHERE status = 'DELIVERED' AND payout_status = 'PENDING' AND delivered_at IS NOT NULL AND delivered_at <= ?
        ORDER BY delivered_at, id LIMIT ?"#,
    )
    .bind(delivered_before)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(groups)
}

pub async fn fetch_releasable_deliveries(
    delivered_before: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Delivery>, sqlx::Error> {
    let deliveries = sqlx::query_as(
        r#"SELECT * FROM deliveries
        WHERE status = 'DELIVERED' AND rider_payout_status = 'PENDING' AND rider_id IS NOT NULL
            AND delivered_at IS NOT NULL AND delivered_at <= ?
        ORDER BY delivered_at, id LIMIT ?"#,
    )
    .bind(delivered_before)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(deliveries)
}

pub async fn fetch_hub_timeout_candidates(
    expected_before: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<SellerGroup>, sqlx::Error> {
    let groups = sqlx::query_as(
        r#"SELECT * FROM seller_groups
        WHERE store_type = 'GENERAL' AND status IN ('PENDING', 'SHIPPED') AND payout_status = 'PENDING'
            AND arrived_at_hub IS NULL AND expected_at_hub IS NOT NULL AND expected_at_hub < ?
            AND order_id IN (SELECT id FROM orders WHERE is_paid = 1 AND status != 'CANCELLED')
        ORDER BY expected_at_hub, id LIMIT ?"#,
    )
    .bind(expected_before)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(groups)
}

pub async fn fetch_unfinalized_delivered_orders(
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<(Order, Delivery)>, sqlx::Error> {
    let orders: Vec<Order> = sqlx::query_as(
        r#"SELECT orders.* FROM orders JOIN deliveries ON deliveries.order_id = orders.id
        WHERE orders.is_paid = 1 AND orders.status IN ('PAID', 'PROCESSING', 'SHIPPED')
            AND deliveries.status = 'DELIVERED'
        ORDER BY orders.id LIMIT ?"#,
    )
    .bind(limit)
    .fetch_all(&mut *conn)
    .await?;
    let mut result = Vec::with_capacity(orders.len());
    for order in orders {
        if let Some(delivery) = fetch_delivery_for_order(order.id, conn).await? {
            result.push((order, delivery));
        }
    }
    Ok(result)
}
