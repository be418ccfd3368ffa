use cachewarm_core::{AppConfig, FileJobSource, JobEntry, JobSource};

/// Load the job list and print every entry, failing if any were rejected.
pub(crate) fn run_jobs_check(config: &AppConfig) -> anyhow::Result<()> {
    let source = FileJobSource::new(&config.jobs_file);
    let registry = source.load()?;

    println!("{} job(s) in {}", registry.len(), source.describe());
    for entry in registry.entries() {
        match entry {
            JobEntry::Ready(job) => println!(
                "  ok        {:<24} {} {} -> {} (ttl {}s, retry {}s)",
                job.name, job.method, job.url, job.cache_key, job.ttl_secs, job.retry_secs
            ),
            JobEntry::Rejected(rejected) => println!(
                "  rejected  {:<24} #{}: {}",
                rejected.name, rejected.index, rejected.reason
            ),
        }
    }

    let rejected = registry.rejected().count();
    if rejected > 0 {
        anyhow::bail!("{rejected} job(s) rejected");
    }
    Ok(())
}
