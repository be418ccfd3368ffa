//! Capped exponential backoff after failed refreshes.
//!
//! After the `n`-th consecutive failure a job waits
//! `min(max_backoff, retry * 2^min(n, 8))` seconds, so the delay is never
//! zero and never unbounded.

/// Exponent cap; `2^8 = 256` times the retry floor.
const MAX_EXPONENT: u32 = 8;

/// Seconds to wait after `fail_count` consecutive failures.
#[must_use]
pub fn backoff_secs(retry_secs: u64, fail_count: u32, max_backoff_secs: u64) -> u64 {
    let base = retry_secs.max(1);
    let factor = 1u64 << fail_count.min(MAX_EXPONENT);
    base.saturating_mul(factor).min(max_backoff_secs.max(1))
}

/// Unix time before which a job with `fail_count` failures must not be retried.
#[must_use]
pub fn next_backoff_until(now: i64, retry_secs: u64, fail_count: u32, max_backoff_secs: u64) -> i64 {
    let wait = i64::try_from(backoff_secs(retry_secs, fail_count, max_backoff_secs)).unwrap_or(i64::MAX);
    now.saturating_add(wait)
}
