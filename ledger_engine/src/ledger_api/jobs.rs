use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{db_types::Job, traits::JobError};

pub const DEFAULT_MAX_RETRIES: i64 = 5;

/// Deferred work, one variant per job type.
///
/// Payloads are stored as JSON next to the job type name. They are decoded back into this enum before a worker sees
/// them; a row that does not decode is failed rather than guessed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPayload {
    ReleaseOrderPayout { order_id: i64, release_at: DateTime<Utc> },
    ReleaseSellerGroup { group_id: i64 },
    ReleaseRiderPayout { delivery_id: i64 },
    HubTimeoutRefund { group_id: i64 },
}

impl JobPayload {
    pub fn job_type(&self) -> &'static str {
        match self {
            JobPayload::ReleaseOrderPayout { .. } => "RELEASE_ORDER_PAYOUT",
            JobPayload::ReleaseSellerGroup { .. } => "RELEASE_SELLER_GROUP",
            JobPayload::ReleaseRiderPayout { .. } => "RELEASE_RIDER_PAYOUT",
            JobPayload::HubTimeoutRefund { .. } => "HUB_TIMEOUT_REFUND",
        }
    }

    /// The key that stops the same piece of work from being queued twice.
    pub fn dedupe_key(&self) -> String {
        match self {
            JobPayload::ReleaseOrderPayout { order_id, .. } => format!("release-order-{order_id}"),
            JobPayload::ReleaseSellerGroup { group_id } => format!("release-group-{group_id}"),
            JobPayload::ReleaseRiderPayout { delivery_id } => format!("release-rider-{delivery_id}"),
            JobPayload::HubTimeoutRefund { group_id } => format!("hub-timeout-{group_id}"),
        }
    }

    pub fn to_json(&self) -> Result<String, JobError> {
        serde_json::to_string(self).map_err(|e| JobError::InvalidPayload(e.to_string()))
    }
}

impl TryFrom<&Job> for JobPayload {
    type Error = JobError;

    fn try_from(job: &Job) -> Result<Self, Self::Error> {
        let payload: JobPayload =
            serde_json::from_str(&job.payload).map_err(|e| JobError::InvalidPayload(e.to_string()))?;
        if payload.job_type() != job.job_type {
            return Err(JobError::InvalidPayload(format!(
                "job #{} is a {} job but carries a {} payload",
                job.id,
                job.job_type,
                payload.job_type()
            )));
        }
        Ok(payload)
    }
}
