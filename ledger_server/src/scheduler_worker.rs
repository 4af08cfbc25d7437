use std::time::Duration;

use chrono::Utc;
use ledger_engine::{SchedulerApi, SqliteDatabase, WorkerReport};
use log::*;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

/// Starts the escrow scheduler. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every tick runs each worker once. Workers take their own cron locks, so it is safe to run this alongside an
/// external scheduler calling the `/cron` routes, or in several server instances at once.
pub fn start_scheduler_worker(api: SchedulerApi<SqliteDatabase>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("🕰️ Escrow scheduler started. Running every {}s", period.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running escrow workers");
            let reports = api.run_all(Utc::now()).await;
            log_reports(&reports);
        }
    })
}

fn log_reports(reports: &[WorkerReport]) {
    for report in reports {
        let result = &report.result;
        if result.failed > 0 {
            warn!(
                "🕰️ {}: {} processed, {} failed. {}",
                report.worker,
                result.processed,
                result.failed,
                result.reason.as_deref().unwrap_or_default()
            );
        } else if !result.skipped {
            info!("🕰️ {}: {} processed", report.worker, result.processed);
        }
    }
}
