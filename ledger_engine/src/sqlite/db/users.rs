use sqlx::SqliteConnection;

use crate::db_types::{NewUser, User};

pub async fn create_user(user: NewUser, conn: &mut SqliteConnection) -> Result<User, sqlx::Error> {
    let user = sqlx::query_as("INSERT INTO users (name, role, stripe_account_id) VALUES (?, ?, ?) RETURNING *")
        .bind(user.name)
        .bind(user.role)
        .bind(user.stripe_account_id)
        .fetch_one(conn)
        .await?;
    Ok(user)
}

pub async fn fetch_user(user_id: i64, conn: &mut SqliteConnection) -> Result<Option<User>, sqlx::Error> {
    let user = sqlx::query_as("SELECT * FROM users WHERE id = ?").bind(user_id).fetch_optional(conn).await?;
    Ok(user)
}

pub async fn set_payout_account(
    user_id: i64,
    account_id: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<Option<User>, sqlx::Error> {
    let user = sqlx::query_as(
        "UPDATE users SET stripe_account_id = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ? RETURNING *",
    )
    .bind(account_id)
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    Ok(user)
}
