use sqlx::SqliteConnection;

use crate::{
    db_types::{NewWalletTransaction, TransactionType, WalletTransaction},
    traits::InsertResult,
};

/// Records a wallet history row, once per reference.
pub async fn idempotent_insert(
    tx: NewWalletTransaction,
    conn: &mut SqliteConnection,
) -> Result<InsertResult<WalletTransaction>, sqlx::Error> {
    if let Some(existing) = fetch_by_reference(&tx.reference, conn).await? {
        return Ok(InsertResult::AlreadyExists(existing));
    }
    let reference = tx.reference.clone();
    let result = sqlx::query_as(
        r#"
            INSERT INTO transactions (wallet_id, order_id, user_id, amount, tx_type, status, reference, description)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *;
        "#,
    )
    .bind(tx.wallet_id)
    .bind(tx.order_id)
    .bind(tx.user_id)
    .bind(tx.amount)
    .bind(tx.tx_type)
    .bind(tx.status)
    .bind(tx.reference)
    .bind(tx.description)
    .fetch_one(&mut *conn)
    .await;
    match result {
        Ok(created) => Ok(InsertResult::Inserted(created)),
        Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
            let existing = fetch_by_reference(&reference, conn).await?.ok_or(sqlx::Error::RowNotFound)?;
            Ok(InsertResult::AlreadyExists(existing))
        },
        Err(e) => Err(e),
    }
}

pub async fn fetch_by_reference(
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<WalletTransaction>, sqlx::Error> {
    let tx = sqlx::query_as("SELECT * FROM transactions WHERE reference = ?")
        .bind(reference)
        .fetch_optional(conn)
        .await?;
    Ok(tx)
}

/// Returns the first seller or rider payout transaction recorded against the order, if there is one.
pub async fn fetch_payout_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<WalletTransaction>, sqlx::Error> {
    let [a, b, c] = TransactionType::payout_types();
    let tx = sqlx::query_as(
        "SELECT * FROM transactions WHERE order_id = ? AND tx_type IN (?, ?, ?) ORDER BY id LIMIT 1",
    )
    .bind(order_id)
    .bind(a)
    .bind(b)
    .bind(c)
    .fetch_optional(conn)
    .await?;
    Ok(tx)
}

pub async fn fetch_for_wallet(
    wallet_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<WalletTransaction>, sqlx::Error> {
    let txs = sqlx::query_as("SELECT * FROM transactions WHERE wallet_id = ? ORDER BY id")
        .bind(wallet_id)
        .fetch_all(conn)
        .await?;
    Ok(txs)
}

pub async fn fetch_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<WalletTransaction>, sqlx::Error> {
    let txs = sqlx::query_as("SELECT * FROM transactions WHERE order_id = ? ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(txs)
}
