use cachewarm_core::{AppConfig, Clock, FileJobSource, JobSource, SystemClock};
use cachewarm_store::{CacheStore, StateStore};
use serde_json::json;

/// Print a job's scheduling state, plus its cache entry and last attempt
/// record when the job is in the job list.
pub(crate) fn run_state(config: &AppConfig, name: &str) -> anyhow::Result<()> {
    let state = StateStore::new(&config.state_dir).read(name)?;
    let mut output = json!({ "name": name, "state": state });

    let registry = match FileJobSource::new(&config.jobs_file).load() {
        Ok(registry) => Some(registry),
        Err(e) => {
            tracing::warn!(error = %e, "job list unavailable; showing state only");
            None
        }
    };
    let job = registry
        .as_ref()
        .and_then(|r| r.jobs().find(|j| j.name == name));
    if let Some(job) = job {
        let cache = CacheStore::new(&config.cache_dir);
        output["cache_key"] = json!(job.cache_key.as_str());
        output["cache_age_secs"] = json!(cache.age(&job.cache_key, SystemClock.now())?);
        output["last_attempt"] = json!(cache.read_meta(&job.cache_key)?);
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
