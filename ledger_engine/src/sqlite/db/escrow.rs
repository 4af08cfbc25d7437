use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{EscrowEntry, EscrowEntryType, EscrowStatus, NewEscrowEntry},
    traits::InsertResult,
};

pub async fn idempotent_insert(
    entry: NewEscrowEntry,
    conn: &mut SqliteConnection,
) -> Result<InsertResult<EscrowEntry>, sqlx::Error> {
    if let Some(existing) = fetch_entry(&entry.reference, conn).await? {
        return Ok(InsertResult::AlreadyExists(existing));
    }
    let reference = entry.reference.clone();
    let metadata = entry.metadata.map(|m| m.to_string());
    let result = sqlx::query_as(
        r#"
            INSERT INTO escrow_ledger
                (order_id, seller_group_id, user_id, role, entry_type, amount, status, reference, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *;
        "#,
    )
    .bind(entry.order_id)
    .bind(entry.seller_group_id)
    .bind(entry.user_id)
    .bind(entry.role)
    .bind(entry.entry_type)
    .bind(entry.amount)
    .bind(entry.status)
    .bind(entry.reference)
    .bind(metadata)
    .fetch_one(&mut *conn)
    .await;
    match result {
        Ok(created) => {
            trace!("🗃️ Escrow entry {reference} created");
            Ok(InsertResult::Inserted(created))
        },
        Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
            let existing = fetch_entry(&reference, conn).await?.ok_or(sqlx::Error::RowNotFound)?;
            Ok(InsertResult::AlreadyExists(existing))
        },
        Err(e) => Err(e),
    }
}

pub async fn fetch_entry(reference: &str, conn: &mut SqliteConnection) -> Result<Option<EscrowEntry>, sqlx::Error> {
    let entry = sqlx::query_as("SELECT * FROM escrow_ledger WHERE reference = ?")
        .bind(reference)
        .fetch_optional(conn)
        .await?;
    Ok(entry)
}

pub async fn fetch_entries_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<EscrowEntry>, sqlx::Error> {
    let entries = sqlx::query_as("SELECT * FROM escrow_ledger WHERE order_id = ? ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}

/// Moves the order's earning rows of the given types from `from` to `to`, and returns the rows that actually moved.
/// Rows in any other state are left alone, so statuses only ever move forward.
pub async fn transition_order_entries(
    order_id: i64,
    entry_types: &[EscrowEntryType],
    from: EscrowStatus,
    to: EscrowStatus,
    metadata: &serde_json::Value,
    conn: &mut SqliteConnection,
) -> Result<Vec<EscrowEntry>, sqlx::Error> {
    let mut moved = Vec::new();
    for entry_type in entry_types {
        let rows: Vec<EscrowEntry> = sqlx::query_as(
            r#"UPDATE escrow_ledger SET status = ?, metadata = ?, updated_at = CURRENT_TIMESTAMP
            WHERE order_id = ? AND entry_type = ? AND status = ? RETURNING *"#,
        )
        .bind(to)
        .bind(metadata.to_string())
        .bind(order_id)
        .bind(entry_type)
        .bind(from)
        .fetch_all(&mut *conn)
        .await?;
        moved.extend(rows);
    }
    trace!("🗃️ {} escrow rows for order #{order_id} moved from {from} to {to}", moved.len());
    Ok(moved)
}

/// As [`transition_order_entries`], restricted to one seller group.
pub async fn transition_group_entries(
    group_id: i64,
    entry_types: &[EscrowEntryType],
    from: EscrowStatus,
    to: EscrowStatus,
    metadata: &serde_json::Value,
    conn: &mut SqliteConnection,
) -> Result<Vec<EscrowEntry>, sqlx::Error> {
    let mut moved = Vec::new();
    for entry_type in entry_types {
        let rows: Vec<EscrowEntry> = sqlx::query_as(
            r#"UPDATE escrow_ledger SET status = ?, metadata = ?, updated_at = CURRENT_TIMESTAMP
            WHERE seller_group_id = ? AND entry_type = ? AND status = ? RETURNING *"#,
        )
        .bind(to)
        .bind(metadata.to_string())
        .bind(group_id)
        .bind(entry_type)
        .bind(from)
        .fetch_all(&mut *conn)
        .await?;
        moved.extend(rows);
    }
    Ok(moved)
}

/// Moves a single row, identified by its reference, from `from` to `to`.
pub async fn transition_entry(
    reference: &str,
    from: EscrowStatus,
    to: EscrowStatus,
    metadata: &serde_json::Value,
    conn: &mut SqliteConnection,
) -> Result<Option<EscrowEntry>, sqlx::Error> {
    let entry = sqlx::query_as(
        r#"UPDATE escrow_ledger SET status = ?, metadata = ?, updated_at = CURRENT_TIMESTAMP
        WHERE reference = ? AND status = ? RETURNING *"#,
    )
    .bind(to)
    .bind(metadata.to_string())
    .bind(reference)
    .bind(from)
    .fetch_optional(conn)
    .await?;
    Ok(entry)
}
