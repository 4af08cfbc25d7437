use sqlx::SqliteConnection;

use crate::db_types::{EntryDirection, EscrowEntryType, EscrowStatus, Usd, Wallet};

/// Fetches the user's wallet, creating it first if necessary. Concurrent callers all end up with the same row.
pub async fn fetch_or_create_wallet(user_id: i64, conn: &mut SqliteConnection) -> Result<Wallet, sqlx::Error> {
    sqlx::query("INSERT INTO wallets (user_id) VALUES (?) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    let wallet = sqlx::query_as("SELECT * FROM wallets WHERE user_id = ?").bind(user_id).fetch_one(conn).await?;
    Ok(wallet)
}

pub async fn fetch_wallet(wallet_id: i64, conn: &mut SqliteConnection) -> Result<Option<Wallet>, sqlx::Error> {
    let wallet = sqlx::query_as("SELECT * FROM wallets WHERE id = ?").bind(wallet_id).fetch_optional(conn).await?;
    Ok(wallet)
}

pub async fn fetch_wallet_for_user(user_id: i64, conn: &mut SqliteConnection) -> Result<Option<Wallet>, sqlx::Error> {
    let wallet =
        sqlx::query_as("SELECT * FROM wallets WHERE user_id = ?").bind(user_id).fetch_optional(conn).await?;
    Ok(wallet)
}

/// The wallet balance according to the journal: all credits minus all debits.
pub async fn ledger_balance(wallet_id: i64, conn: &mut SqliteConnection) -> Result<Usd, sqlx::Error> {
    let cents: i64 = sqlx::query_scalar(
        r#"SELECT COALESCE(SUM(CASE direction WHEN ? THEN amount ELSE -amount END), 0)
        FROM ledger_entries WHERE wallet_id = ?"#,
    )
    .bind(EntryDirection::Credit)
    .bind(wallet_id)
    .fetch_one(conn)
    .await?;
    Ok(Usd::from(cents))
}

/// The user's earnings that are held in escrow awaiting release.
pub async fn held_earnings(user_id: i64, conn: &mut SqliteConnection) -> Result<Usd, sqlx::Error> {
    let cents: i64 = sqlx::query_scalar(
        r#"SELECT COALESCE(SUM(amount - withdrawn_amount), 0) FROM escrow_ledger
        WHERE user_id = ? AND status = ? AND entry_type IN (?, ?)"#,
    )
    .bind(user_id)
    .bind(EscrowStatus::Held)
    .bind(EscrowEntryType::SellerEarning)
    .bind(EscrowEntryType::RiderEarning)
    .fetch_one(conn)
    .await?;
    Ok(Usd::from(cents))
}

pub(in crate::sqlite::db) async fn adjust_balance(
    wallet_id: i64,
    delta: Usd,
    conn: &mut SqliteConnection,
) -> Result<Wallet, sqlx::Error> {
    let wallet = sqlx::query_as(
        "UPDATE wallets SET balance = balance + ?, updated_at = CURRENT_TIMESTAMP WHERE id = ? RETURNING *",
    )
    .bind(delta)
    .bind(wallet_id)
    .fetch_one(conn)
    .await?;
    Ok(wallet)
}

pub(in crate::sqlite::db) async fn adjust_pending(
    wallet_id: i64,
    delta: Usd,
    conn: &mut SqliteConnection,
) -> Result<Wallet, sqlx::Error> {
    let wallet = sqlx::query_as(
        "UPDATE wallets SET pending = pending + ?, updated_at = CURRENT_TIMESTAMP WHERE id = ? RETURNING *",
    )
    .bind(delta)
    .bind(wallet_id)
    .fetch_one(conn)
    .await?;
    Ok(wallet)
}

pub(in crate::sqlite::db) async fn add_earnings(
    wallet_id: i64,
    amount: Usd,
    conn: &mut SqliteConnection,
) -> Result<Wallet, sqlx::Error> {
    let wallet = sqlx::query_as(
        r#"UPDATE wallets SET total_earnings = total_earnings + ?, updated_at = CURRENT_TIMESTAMP
        WHERE id = ? RETURNING *"#,
    )
    .bind(amount)
    .bind(wallet_id)
    .fetch_one(conn)
    .await?;
    Ok(wallet)
}

pub(in crate::sqlite::db) async fn overwrite_balance(
    wallet_id: i64,
    balance: Usd,
    conn: &mut SqliteConnection,
) -> Result<Option<Wallet>, sqlx::Error> {
    let wallet =
        sqlx::query_as("UPDATE wallets SET balance = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ? RETURNING *")
            .bind(balance)
            .bind(wallet_id)
            .fetch_optional(conn)
            .await?;
    Ok(wallet)
}
