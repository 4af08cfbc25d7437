use chrono::Duration;

use crate::db_types::Usd;

/// Named cron locks older than this are considered abandoned and may be taken over.
pub const CRON_LOCK_TIMEOUT_MINUTES: i64 = 10;

/// Timing and sizing knobs for the escrow release and withdrawal flows.
#[derive(Debug, Clone, Copy)]
pub struct PayoutPolicy {
    /// How long after delivery confirmation funds stay in escrow before they may be released.
    pub release_delay: Duration,
    /// How long after its expected arrival a non-food seller group may take to reach the hub before it is refunded.
    pub hub_timeout: Duration,
    /// The most items a worker handles per tick.
    pub batch_size: i64,
    pub cron_lock_timeout: Duration,
    /// How long a job that hit a retryable skip or an error waits before it runs again.
    pub job_retry_delay: Duration,
    pub min_withdrawal: Usd,
}

impl Default for PayoutPolicy {
    fn default() -> Self {
        Self {
            release_delay: Duration::hours(24),
            hub_timeout: Duration::hours(48),
            batch_size: 20,
            cron_lock_timeout: Duration::minutes(CRON_LOCK_TIMEOUT_MINUTES),
            job_retry_delay: Duration::minutes(30),
            min_withdrawal: Usd::from_dollars(10),
        }
    }
}

impl PayoutPolicy {
    pub fn with_release_delay(mut self, delay: Duration) -> Self {
        self.release_delay = delay;
        self
    }

    pub fn with_hub_timeout(mut self, timeout: Duration) -> Self {
        self.hub_timeout = timeout;
        self
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_min_withdrawal(mut self, min: Usd) -> Self {
        self.min_withdrawal = min;
        self
    }
}
