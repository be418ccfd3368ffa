//! Fetch-through cache with stale fallback.
//!
//! A fresh entry is served without touching the network. Otherwise the remote
//! is fetched; a verified-good response replaces the entry atomically, and any
//! failure falls back to the stale entry while still reporting the error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cachewarm_core::{CacheKey, Clock, ContentFormat, ResponseTest, SystemClock};
use cachewarm_fetch::{Fetch, FetchOutcome, FetchRequest};
use cachewarm_store::{CacheEntry, CacheStore};

use crate::error::Failure;
use crate::validate::validate;

/// Result of a cached fetch. `data` and `error` may both be set: that is a
/// stale payload served because the refresh failed.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub data: Option<Vec<u8>>,
    pub error: Option<Failure>,
    /// Age of `data` in seconds; `0` for a payload fetched just now, `None`
    /// when there is no data.
    pub from_cache_age_secs: Option<u64>,
    /// Status of the response `data` came from, or of the failed fetch when
    /// there is no data (`0` if the remote was never reached).
    pub status_code: u16,
}

impl CachedResponse {
    /// Data served from cache because the refresh failed.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.data.is_some() && self.error.is_some()
    }

    #[must_use]
    pub fn text(&self) -> Option<String> {
        self.data
            .as_deref()
            .map(|d| String::from_utf8_lossy(d).into_owned())
    }

    fn from_entry(entry: CacheEntry, now: i64, error: Option<Failure>) -> Self {
        Self {
            from_cache_age_secs: Some(entry.age(now)),
            status_code: entry.status_code,
            data: Some(entry.payload),
            error,
        }
    }
}

/// Serve `key` from `store` if younger than `ttl_secs`, else refresh it with
/// `fetch`.
///
/// `check` decides whether a 2xx body may be committed. The store is only
/// written after a successful, verified fetch.
pub async fn cached_fetch<F, Fut, V>(
    store: &CacheStore,
    key: &CacheKey,
    ttl_secs: u64,
    now: i64,
    check: V,
    fetch: F,
) -> CachedResponse
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = FetchOutcome>,
    V: FnOnce(&[u8]) -> Result<(), Failure>,
{
    let cached = match store.get(key) {
        Ok(entry) => entry,
        Err(e) => {
            tracing::warn!(cache_key = %key, error = %e, "cache read failed, treating as miss");
            None
        }
    };

    if let Some(entry) = cached.as_ref() {
        if entry.age(now) <= ttl_secs {
            tracing::debug!(cache_key = %key, age = entry.age(now), "cache hit");
            return CachedResponse::from_entry(entry.clone(), now, None);
        }
    }

    let outcome = fetch().await;
    let verdict = match outcome.error.clone() {
        Some(err) => Err(Failure::from(err)),
        None if !outcome.ok => Err(Failure::Validation(format!(
            "unexpected status {}",
            outcome.status_code
        ))),
        None => check(&outcome.body),
    };

    if let Err(failure) = verdict {
        tracing::warn!(
            cache_key = %key,
            status = outcome.status_code,
            stale = cached.is_some(),
            error = %failure,
            "refresh failed"
        );
        return match cached {
            Some(entry) => CachedResponse::from_entry(entry, now, Some(failure)),
            None => CachedResponse {
                data: None,
                error: Some(failure),
                from_cache_age_secs: None,
                status_code: outcome.status_code,
            },
        };
    }

    let error = store
        .put(key, &outcome.body, outcome.status_code, now)
        .err()
        .map(|e| {
            tracing::error!(cache_key = %key, error = %e, "fetched payload could not be stored");
            Failure::from(e)
        });
    CachedResponse {
        data: Some(outcome.body),
        error,
        from_cache_age_secs: Some(0),
        status_code: outcome.status_code,
    }
}

/// Foreground cached fetch over a configured transport.
pub struct CachedFetcher<F> {
    fetcher: F,
    store: CacheStore,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl<F: Fetch> CachedFetcher<F> {
    pub fn new(fetcher: F, store: CacheStore, timeout: Duration) -> Self {
        Self {
            fetcher,
            store,
            clock: Arc::new(SystemClock),
            timeout,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Fetch `request` through the cache entry `key`.
    pub async fn get(
        &self,
        key: &CacheKey,
        request: &FetchRequest,
        ttl_secs: u64,
        format: ContentFormat,
        test: &ResponseTest,
    ) -> CachedResponse {
        cached_fetch(
            &self.store,
            key,
            ttl_secs,
            self.clock.now(),
            |body| validate(body, format, test),
            || self.fetcher.fetch(request),
        )
        .await
    }

    /// `GET` a URL through a cache entry derived from the URL and `test`.
    ///
    /// The body only has to be non-blank and pass `test`.
    pub async fn get_url(&self, url: &str, ttl_secs: u64, test: &ResponseTest) -> CachedResponse {
        let key = CacheKey::derived(url, test);
        let request = FetchRequest::get(url, self.timeout);
        self.get(&key, &request, ttl_secs, ContentFormat::Text, test)
            .await
    }
}
