use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Job, JobStatus},
    ledger_api::jobs::JobPayload,
    traits::{InsertResult, JobError},
};

/// Queues a job unless one with the same dedupe key already exists.
pub async fn insert_job(
    payload: &JobPayload,
    run_at: DateTime<Utc>,
    max_retries: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<InsertResult<Job>, JobError> {
    let dedupe_key = payload.dedupe_key();
    if let Some(existing) = fetch_job_by_dedupe_key(&dedupe_key, conn).await? {
        return Ok(InsertResult::AlreadyExists(existing));
    }
    let result = sqlx::query_as(
        r#"
            INSERT INTO jobs (job_type, payload, max_retries, run_at, dedupe_key, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING *;
        "#,
    )
    .bind(payload.job_type())
    .bind(payload.to_json()?)
    .bind(max_retries)
    .bind(run_at)
    .bind(&dedupe_key)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await;
    match result {
        Ok(job) => {
            debug!("🕰️ Queued {} job [{dedupe_key}] for {run_at}", payload.job_type());
            Ok(InsertResult::Inserted(job))
        },
        Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
            let existing = fetch_job_by_dedupe_key(&dedupe_key, conn).await?.ok_or(sqlx::Error::RowNotFound)?;
            Ok(InsertResult::AlreadyExists(existing))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_job_by_dedupe_key(key: &str, conn: &mut SqliteConnection) -> Result<Option<Job>, sqlx::Error> {
    let job = sqlx::query_as("SELECT * FROM jobs WHERE dedupe_key = ?").bind(key).fetch_optional(conn).await?;
    Ok(job)
}

/// Claims due jobs in a single statement, so two workers can never claim the same job.
pub async fn claim_due_jobs(
    now: DateTime<Utc>,
    stale_before: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Job>, sqlx::Error> {
    let jobs = sqlx::query_as(
        r#"
        UPDATE jobs SET status = 'PROCESSING', attempts = attempts + 1, updated_at = ?
        WHERE id IN (
            SELECT id FROM jobs
            WHERE (status = 'PENDING' AND run_at <= ?) OR (status = 'PROCESSING' AND updated_at < ?)
            ORDER BY run_at, id
            LIMIT ?
        )
        RETURNING *;
        "#,
    )
    .bind(now)
    .bind(now)
    .bind(stale_before)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(jobs)
}

pub async fn finish_job(
    id: i64,
    status: JobStatus,
    error: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Job>, sqlx::Error> {
    let job = sqlx::query_as(
        r#"UPDATE jobs SET status = ?, last_error = COALESCE(?, last_error), updated_at = ?
        WHERE id = ? RETURNING *"#,
    )
    .bind(status)
    .bind(error)
    .bind(now)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(job)
}

/// Requeues the job for `retry_at`, or marks it FAILED once `attempts` has reached `max_retries`.
pub async fn retry_job(
    id: i64,
    error: &str,
    retry_at: DateTime<Utc>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Job>, sqlx::Error> {
    let job = sqlx::query_as(
        r#"UPDATE jobs SET
            status = CASE WHEN attempts >= max_retries THEN 'FAILED' ELSE 'PENDING' END,
            run_at = CASE WHEN attempts >= max_retries THEN run_at ELSE ? END,
            last_error = ?,
            updated_at = ?
        WHERE id = ? RETURNING *"#,
    )
    .bind(retry_at)
    .bind(error)
    .bind(now)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(job)
}
