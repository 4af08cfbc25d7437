use chrono::NaiveDate;
use sqlx::{FromRow, SqliteConnection};

use super::wallets;
use crate::db_types::{EscrowSnapshot, Usd};

#[derive(Debug, Default, FromRow)]
struct EscrowTotals {
    total_pending: i64,
    total_held: i64,
    total_released: i64,
    total_cancelled: i64,
    held_count: i64,
}

/// Writes the day's escrow totals. Returns `None` if the day already has a snapshot.
pub async fn create_snapshot(
    date: NaiveDate,
    treasury_user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<EscrowSnapshot>, sqlx::Error> {
    let totals: EscrowTotals = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(CASE status WHEN 'PENDING' THEN amount ELSE 0 END), 0) AS total_pending,
            COALESCE(SUM(CASE status WHEN 'HELD' THEN amount - withdrawn_amount ELSE 0 END), 0) AS total_held,
            COALESCE(SUM(CASE status WHEN 'RELEASED' THEN amount ELSE 0 END), 0) AS total_released,
            COALESCE(SUM(CASE status WHEN 'CANCELLED' THEN amount ELSE 0 END), 0) AS total_cancelled,
            COALESCE(SUM(CASE status WHEN 'HELD' THEN 1 ELSE 0 END), 0) AS held_count
        FROM escrow_ledger
        WHERE entry_type IN ('SELLER_EARNING', 'RIDER_EARNING', 'PLATFORM_COMMISSION')
        "#,
    )
    .fetch_one(&mut *conn)
    .await?;
    let treasury = wallets::fetch_or_create_wallet(treasury_user_id, conn).await?;
    let snapshot = sqlx::query_as(
        r#"
        INSERT INTO escrow_snapshots
            (snapshot_date, total_pending, total_held, total_released, total_cancelled, held_count, treasury_balance)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (snapshot_date) DO NOTHING
        RETURNING *;
        "#,
    )
    .bind(date)
    .bind(Usd::from(totals.total_pending))
    .bind(Usd::from(totals.total_held))
    .bind(Usd::from(totals.total_released))
    .bind(Usd::from(totals.total_cancelled))
    .bind(totals.held_count)
    .bind(treasury.balance)
    .fetch_optional(conn)
    .await?;
    Ok(snapshot)
}

pub async fn fetch_snapshot(
    date: NaiveDate,
    conn: &mut SqliteConnection,
) -> Result<Option<EscrowSnapshot>, sqlx::Error> {
    let snapshot = sqlx::query_as("SELECT * FROM escrow_snapshots WHERE snapshot_date = ?")
        .bind(date)
        .fetch_optional(conn)
        .await?;
    Ok(snapshot)
}
