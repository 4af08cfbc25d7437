use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

/// Takes the named lock. Returns false if another process holds it and has held it since `stale_before` or later.
///
/// A lock that is older than `stale_before` belonged to a process that died without releasing it, and is taken over.
pub async fn acquire(
    name: &str,
    now: DateTime<Utc>,
    stale_before: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let inserted = sqlx::query("INSERT INTO cron_locks (name, locked_at) VALUES (?, ?) ON CONFLICT (name) DO NOTHING")
        .bind(name)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    if inserted.rows_affected() == 1 {
        trace!("🔒️ Lock [{name}] acquired");
        return Ok(true);
    }
    let recovered = sqlx::query("UPDATE cron_locks SET locked_at = ? WHERE name = ? AND locked_at < ?")
        .bind(now)
        .bind(name)
        .bind(stale_before)
        .execute(conn)
        .await?;
    if recovered.rows_affected() == 1 {
        warn!("🔒️ Lock [{name}] was stale and has been taken over");
        Ok(true)
    } else {
        debug!("🔒️ Lock [{name}] is held by another process");
        Ok(false)
    }
}

pub async fn release(name: &str, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM cron_locks WHERE name = ?").bind(name).execute(conn).await?;
    trace!("🔒️ Lock [{name}] released");
    Ok(())
}
