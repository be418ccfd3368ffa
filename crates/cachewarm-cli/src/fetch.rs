use std::io::Write;

use cachewarm_core::{AppConfig, ResponseTest};
use cachewarm_fetch::Fetcher;
use cachewarm_runner::CachedFetcher;
use cachewarm_store::CacheStore;

/// Fetch `url` through the cache and write the body to stdout.
///
/// A stale body is still printed; the refresh error goes to the log.
pub(crate) async fn run_fetch(
    config: &AppConfig,
    url: &str,
    ttl: u64,
    expect: Option<&str>,
) -> anyhow::Result<()> {
    let fetcher = Fetcher::from_config(config)?;
    let cached = CachedFetcher::new(fetcher, CacheStore::new(&config.cache_dir), config.timeout());
    let test = expect
        .filter(|s| !s.is_empty())
        .map_or(ResponseTest::None, |s| ResponseTest::Contains(s.to_string()));

    let response = cached.get_url(url, ttl, &test).await;

    if let Some(error) = &response.error {
        tracing::warn!(
            url,
            stale = response.is_stale(),
            age_secs = response.from_cache_age_secs,
            %error,
            "refresh failed"
        );
    }
    let Some(data) = response.data else {
        let reason = response
            .error
            .map_or_else(|| "no data".to_string(), |e| e.to_string());
        anyhow::bail!("fetch of {url} failed: {reason}");
    };

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&data)?;
    stdout.flush()?;
    Ok(())
}
