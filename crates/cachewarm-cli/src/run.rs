use cachewarm_core::AppConfig;
use cachewarm_runner::{JobStatus, RunRequest, Runner};

/// Execute a manual warming run and print the outcome.
pub(crate) async fn run_warm(
    config: &AppConfig,
    force: bool,
    budget_ms: Option<u64>,
    job_filter: Vec<String>,
    json: bool,
) -> anyhow::Result<()> {
    let runner = Runner::from_config(config)?;
    let mut request = RunRequest::manual()
        .force(force)
        .budget_ms(budget_ms)
        .jobs(job_filter);
    request.debug = json;

    let report = runner.run(&request).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if let Some(reason) = &report.skipped {
            println!("run skipped: {reason}");
        }
        for job in &report.jobs {
            let detail = match &job.status {
                JobStatus::Ok => format!(
                    "{} bytes in {} ms",
                    job.bytes.unwrap_or(0),
                    job.duration_ms.unwrap_or(0)
                ),
                _ => String::new(),
            };
            println!("{:<24} {:<16} {detail}", job.name, job.status.to_string());
        }
        println!(
            "{} ok, {} errors, {} skipped in {} ms (budget {} ms)",
            report.ok_count(),
            report.error_count(),
            report.skipped_count(),
            report.elapsed_ms,
            report.budget_ms
        );
    }

    if let Some(error) = report.error {
        anyhow::bail!("warm run could not start: {error}");
    }
    Ok(())
}
