//! Server-driven warm runs on a cron schedule.

use std::sync::Arc;

use cachewarm_fetch::Fetcher;
use cachewarm_runner::{RunRequest, Runner};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts a scheduler that runs a full sweep on `cron`
/// (six fields, seconds first, e.g. `0 */5 * * * *`).
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down the schedule.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the expression is invalid or the
/// scheduler cannot be started.
pub async fn build_scheduler(
    runner: Arc<Runner<Fetcher>>,
    cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let runner = Arc::clone(&runner);

        Box::pin(async move {
            tracing::info!("scheduler: starting warm run");
            let report = runner.run(&RunRequest::cron()).await;
            if let Some(error) = &report.error {
                tracing::error!(run_id = %report.run_id, %error, "scheduler: warm run failed");
                return;
            }
            tracing::info!(
                run_id = %report.run_id,
                ok = report.ok_count(),
                errors = report.error_count(),
                skipped = report.skipped_count(),
                elapsed_ms = report.elapsed_ms,
                "scheduler: warm run complete"
            );
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    Ok(scheduler)
}
