//! The periodic workers that drive escrow forward.
//!
//! Every worker takes `now` explicitly, holds its own named cron lock for the whole run and handles at most one batch
//! per call. The next tick picks up whatever is left. An item that fails is logged and counted; it never stops the
//! rest of the batch. The sweeping workers also hand a failed item to the job queue, where its retries are counted
//! and a FAILED job marks it for attention.
use std::{fmt::Debug, future::Future};

use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Job, JobStatus},
    ledger_api::{
        escrow_flow_api::EscrowFlowApi,
        jobs::{JobPayload, DEFAULT_MAX_RETRIES},
        policy::PayoutPolicy,
    },
    traits::{EscrowError, EscrowManagement, JobError, JobManagement, PayoutOutcome},
};

pub const ESCROW_PAYOUTS_LOCK: &str = "escrow-payouts";
pub const SELLER_GROUPS_LOCK: &str = "release-seller-groups";
pub const RIDER_PAYOUTS_LOCK: &str = "release-rider-payouts";
pub const HUB_TIMEOUTS_LOCK: &str = "hub-timeouts";
pub const FINALIZE_DELIVERED_LOCK: &str = "finalize-delivered-orders";
pub const ESCROW_SNAPSHOT_LOCK: &str = "daily-escrow-snapshot";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResult {
    /// True if the worker did not run (the lock was held elsewhere) or found nothing to do.
    pub skipped: bool,
    pub processed: u32,
    pub failed: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl WorkerResult {
    pub fn skipped<S: Into<String>>(reason: S) -> Self {
        Self { skipped: true, reason: Some(reason.into()), ..Default::default() }
    }

    pub fn errored<S: Into<String>>(reason: S) -> Self {
        Self { failed: 1, reason: Some(reason.into()), ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub worker: String,
    #[serde(flatten)]
    pub result: WorkerResult,
}

enum JobRun {
    Completed,
    Resolved,
    Deferred,
    Failed,
}

#[derive(Clone)]
pub struct SchedulerApi<B> {
    flow: EscrowFlowApi<B>,
}

impl<B> Debug for SchedulerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SchedulerApi ({:?})", self.flow)
    }
}

impl<B> SchedulerApi<B> {
    pub fn new(flow: EscrowFlowApi<B>) -> Self {
        Self { flow }
    }

    fn db(&self) -> &B {
        self.flow.db()
    }

    fn policy(&self) -> &PayoutPolicy {
        self.flow.policy()
    }
}

impl<B> SchedulerApi<B>
where B: EscrowManagement + JobManagement
{
    /// Runs the work under the named lock. The lock is released whatever the work returns.
    async fn locked<F>(&self, name: &str, now: DateTime<Utc>, work: F) -> Result<WorkerResult, JobError>
    where F: Future<Output = Result<WorkerResult, JobError>> {
        let stale_before = now - self.policy().cron_lock_timeout;
        if !self.db().acquire_cron_lock(name, now, stale_before).await? {
            info!("🕰️ [{name}] is running elsewhere. Skipping this tick.");
            return Ok(WorkerResult::skipped("lock held"));
        }
        let result = work.await;
        if let Err(e) = self.db().release_cron_lock(name).await {
            error!("🕰️ Could not release lock [{name}]. It will be taken over once it is stale. {e}");
        }
        match &result {
            Ok(r) if !r.skipped => info!("🕰️ [{name}] processed {}, failed {}", r.processed, r.failed),
            Ok(_) => trace!("🕰️ [{name}] had nothing to do"),
            Err(e) => error!("🕰️ [{name}] aborted: {e}"),
        }
        result
    }

    /// Runs the due jobs in the job queue.
    pub async fn process_escrow_payouts(&self, now: DateTime<Utc>) -> Result<WorkerResult, JobError> {
        self.locked(ESCROW_PAYOUTS_LOCK, now, async {
            let stale_before = now - self.policy().cron_lock_timeout;
            let jobs = self.db().claim_due_jobs(now, stale_before, self.policy().batch_size).await?;
            if jobs.is_empty() {
                return Ok(WorkerResult::skipped("no jobs due"));
            }
            let mut result = WorkerResult::default();
            for job in &jobs {
                match self.run_job(job, now).await? {
                    JobRun::Completed => result.processed += 1,
                    JobRun::Resolved | JobRun::Deferred => {},
                    JobRun::Failed => result.failed += 1,
                }
            }
            Ok(result)
        })
        .await
    }

    async fn run_job(&self, job: &Job, now: DateTime<Utc>) -> Result<JobRun, JobError> {
        let payload = match JobPayload::try_from(job) {
            Ok(p) => p,
            Err(e) => {
                warn!("🕰️ Job #{} has an unreadable payload and will not be run. {e}", job.id);
                self.db().finish_job(job.id, JobStatus::Failed, Some(&e.to_string()), now).await?;
                return Ok(JobRun::Failed);
            },
        };
        let outcome = self.run_payload(&payload, now).await;
        let retry_at = now + self.policy().job_retry_delay;
        match outcome {
            Ok(PayoutOutcome::Released(_)) => {
                self.db().finish_job(job.id, JobStatus::Completed, None, now).await?;
                Ok(JobRun::Completed)
            },
            Ok(PayoutOutcome::Skipped(reason)) if reason.is_retryable() => {
                debug!("🕰️ Job #{} deferred: {reason}", job.id);
                self.db().retry_job(job.id, &reason.to_string(), retry_at, now).await?;
                Ok(JobRun::Deferred)
            },
            Ok(PayoutOutcome::Skipped(reason)) => {
                debug!("🕰️ Job #{} resolved without work: {reason}", job.id);
                self.db().finish_job(job.id, JobStatus::Done, Some(&reason.to_string()), now).await?;
                Ok(JobRun::Resolved)
            },
            Err(e) => {
                warn!("🕰️ Job #{} ({}) failed on attempt {}. {e}", job.id, job.job_type, job.attempts);
                let job = self.db().retry_job(job.id, &e.to_string(), retry_at, now).await?;
                if job.status == JobStatus::Failed {
                    error!("🕰️ Job #{} has used up its retries and is marked FAILED", job.id);
                }
                Ok(JobRun::Failed)
            },
        }
    }

    async fn run_payload(&self, payload: &JobPayload, now: DateTime<Utc>) -> Result<PayoutOutcome, EscrowError> {
        match payload {
            JobPayload::ReleaseOrderPayout { order_id, .. } => self.flow.release_order_payout(*order_id, now).await,
            JobPayload::ReleaseSellerGroup { group_id } => self.flow.release_seller_group_payout(*group_id, now).await,
            JobPayload::ReleaseRiderPayout { delivery_id } => self.flow.release_rider_payout(*delivery_id, now).await,
            JobPayload::HubTimeoutRefund { group_id } => self.flow.refund_hub_timeout(*group_id, now).await,
        }
    }

    /// Releases seller groups that were delivered longer than the release delay ago.
    pub async fn release_eligible_seller_groups(&self, now: DateTime<Utc>) -> Result<WorkerResult, JobError> {
        self.locked(SELLER_GROUPS_LOCK, now, async {
            let delivered_before = now - self.policy().release_delay;
            let groups = self
                .db()
                .fetch_releasable_seller_groups(delivered_before, self.policy().batch_size)
                .await
                .map_err(escrow_to_job_error)?;
            let ids = groups.iter().map(|g| g.id).collect::<Vec<_>>();
            let mut result = WorkerResult::default();
            for id in &ids {
                let outcome = self.flow.release_seller_group_payout(*id, now).await;
                let payload = JobPayload::ReleaseSellerGroup { group_id: *id };
                self.tally(&mut result, payload, outcome, now).await;
            }
            Ok(finish_batch(result, ids.is_empty()))
        })
        .await
    }

    /// Releases rider delivery fees for deliveries completed longer than the release delay ago.
    pub async fn release_eligible_rider_payouts(&self, now: DateTime<Utc>) -> Result<WorkerResult, JobError> {
        self.locked(RIDER_PAYOUTS_LOCK, now, async {
            let delivered_before = now - self.policy().release_delay;
            let deliveries = self
                .db()
                .fetch_releasable_deliveries(delivered_before, self.policy().batch_size)
                .await
                .map_err(escrow_to_job_error)?;
            let ids = deliveries.iter().map(|d| d.id).collect::<Vec<_>>();
            let mut result = WorkerResult::default();
            for id in &ids {
                let outcome = self.flow.release_rider_payout(*id, now).await;
                self.tally(&mut result, JobPayload::ReleaseRiderPayout { delivery_id: *id }, outcome, now).await;
            }
            Ok(finish_batch(result, ids.is_empty()))
        })
        .await
    }

    /// Cancels and refunds non-food seller groups that never reached the hub.
    pub async fn process_hub_timeouts(&self, now: DateTime<Utc>) -> Result<WorkerResult, JobError> {
        self.locked(HUB_TIMEOUTS_LOCK, now, async {
            let expected_before = now - self.policy().hub_timeout;
            let groups = self
                .db()
                .fetch_hub_timeout_candidates(expected_before, self.policy().batch_size)
                .await
                .map_err(escrow_to_job_error)?;
            let ids = groups.iter().map(|g| g.id).collect::<Vec<_>>();
            let mut result = WorkerResult::default();
            for id in &ids {
                let outcome = self.flow.refund_hub_timeout(*id, now).await;
                self.tally(&mut result, JobPayload::HubTimeoutRefund { group_id: *id }, outcome, now).await;
            }
            Ok(finish_batch(result, ids.is_empty()))
        })
        .await
    }

    /// Picks up orders whose delivery was confirmed but whose earnings never moved to pending.
    pub async fn finalize_delivered_orders(&self, now: DateTime<Utc>) -> Result<WorkerResult, JobError> {
        self.locked(FINALIZE_DELIVERED_LOCK, now, async {
            let stuck = self
                .db()
                .fetch_unfinalized_delivered_orders(self.policy().batch_size)
                .await
                .map_err(escrow_to_job_error)?;
            let mut result = WorkerResult::default();
            for (order, delivery) in &stuck {
                let confirmed_at = delivery.delivered_at.unwrap_or(now);
                match self.flow.move_order_earnings_to_pending(order.id, confirmed_at).await {
                    Ok(_) => {
                        info!("🕰️ Order #{} was delivered but never finalized. It is now pending release.", order.id);
                        result.processed += 1;
                    },
                    Err(e) => {
                        warn!("🕰️ Could not finalize delivered order #{}. {e}", order.id);
                        result.failed += 1;
                    },
                }
            }
            Ok(finish_batch(result, stuck.is_empty()))
        })
        .await
    }

    /// Records the day's escrow totals. Running it again on the same UTC day does nothing.
    pub async fn create_daily_escrow_snapshot(&self, now: DateTime<Utc>) -> Result<WorkerResult, JobError> {
        self.locked(ESCROW_SNAPSHOT_LOCK, now, async {
            let date = now.date_naive();
            let snapshot = self
                .db()
                .create_escrow_snapshot(date, self.flow.treasury_user_id())
                .await
                .map_err(escrow_to_job_error)?;
            match snapshot {
                Some(s) => {
                    info!("🕰️ Escrow snapshot for {date}: {} held across {} entries", s.total_held, s.held_count);
                    Ok(WorkerResult { processed: 1, ..Default::default() })
                },
                None => Ok(WorkerResult::skipped(format!("snapshot for {date} already exists"))),
            }
        })
        .await
    }

    /// Counts one item of a sweep. A failed item is queued as `payload` so the job worker retries it.
    async fn tally(
        &self,
        result: &mut WorkerResult,
        payload: JobPayload,
        outcome: Result<PayoutOutcome, EscrowError>,
        now: DateTime<Utc>,
    ) {
        let key = payload.dedupe_key();
        let e = match outcome {
            Ok(PayoutOutcome::Released(_)) => {
                result.processed += 1;
                return;
            },
            Ok(PayoutOutcome::Skipped(reason)) => {
                trace!("🕰️ [{key}] skipped: {reason}");
                return;
            },
            Err(e) => e,
        };
        warn!("🕰️ [{key}] failed. {e}");
        result.failed += 1;
        let retry_at = now + self.policy().job_retry_delay;
        match self.db().enqueue_job(&payload, retry_at, DEFAULT_MAX_RETRIES, now).await {
            Ok(job) if job.created() => info!("🕰️ [{key}] handed to the job queue for {retry_at}"),
            Ok(_) => debug!("🕰️ [{key}] is already in the job queue"),
            Err(e) => error!("🕰️ Could not queue [{key}] for a retry. The next sweep will pick it up again. {e}"),
        }
    }

    /// Runs every worker once, in order. A worker that errors is reported and the rest still run.
    pub async fn run_all(&self, now: DateTime<Utc>) -> Vec<WorkerReport> {
        let mut reports = Vec::with_capacity(6);
        let results = [
            ("finalize-delivered", self.finalize_delivered_orders(now).await),
            ("escrow-payouts", self.process_escrow_payouts(now).await),
            ("seller-groups", self.release_eligible_seller_groups(now).await),
            ("rider-payouts", self.release_eligible_rider_payouts(now).await),
            ("hub-timeouts", self.process_hub_timeouts(now).await),
            ("escrow-snapshot", self.create_daily_escrow_snapshot(now).await),
        ];
        for (worker, result) in results {
            let result = result.unwrap_or_else(|e| WorkerResult::errored(e.to_string()));
            reports.push(WorkerReport { worker: worker.to_string(), result });
        }
        reports
    }
}

fn escrow_to_job_error(e: EscrowError) -> JobError {
    JobError::DatabaseError(e.to_string())
}

fn finish_batch(result: WorkerResult, was_empty: bool) -> WorkerResult {
    if was_empty {
        WorkerResult::skipped("nothing due")
    } else {
        result
    }
}
