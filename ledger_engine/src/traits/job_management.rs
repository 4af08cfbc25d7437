use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{Job, JobStatus},
    ledger_api::jobs::JobPayload,
    traits::data_objects::InsertResult,
};

#[derive(Debug, Clone, Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),
    #[error("Job #{0} does not exist")]
    JobNotFound(i64),
}

impl From<sqlx::Error> for JobError {
    fn from(e: sqlx::Error) -> Self {
        JobError::DatabaseError(e.to_string())
    }
}

/// The deferred job queue and the named cron locks that keep scheduled workers from overlapping.
#[allow(async_fn_in_trait)]
pub trait JobManagement {
    /// Queues a job. A job with the same dedupe key is returned as `AlreadyExists` instead.
    async fn enqueue_job(
        &self,
        payload: &JobPayload,
        run_at: DateTime<Utc>,
        max_retries: i64,
        now: DateTime<Utc>,
    ) -> Result<InsertResult<Job>, JobError>;

    /// Claims up to `limit` PENDING jobs that are due at `now`, moving them to PROCESSING and counting the attempt.
    /// PROCESSING jobs not touched since `stale_before` are assumed to belong to a crashed worker and are claimed
    /// again.
    async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Job>, JobError>;

    /// Finishes a job as COMPLETED, DONE or FAILED.
    async fn finish_job(
        &self,
        id: i64,
        status: JobStatus,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Job, JobError>;

    /// Puts a job back in the queue for `retry_at`, or fails it if it has used up its attempts.
    async fn retry_job(
        &self,
        id: i64,
        error: &str,
        retry_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Job, JobError>;

    async fn fetch_job_by_dedupe_key(&self, key: &str) -> Result<Option<Job>, JobError>;

    /// Takes the named lock. Returns false if another process holds it and the lock is younger than `stale_before`.
    async fn acquire_cron_lock(
        &self,
        name: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, JobError>;

    async fn release_cron_lock(&self, name: &str) -> Result<(), JobError>;
}
