use serde::{Deserialize, Serialize};

/// Record of a job's most recent attempt, written next to its payload as
/// `<cache_key>.meta.json` whether or not the attempt succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMeta {
    /// RFC 3339 timestamp of the attempt.
    pub generated_at: String,
    pub name: String,
    pub url: String,
    pub method: String,
    pub http_code: u16,
    pub ok: bool,
    pub bytes: u64,
    pub sha256: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub cache_key: String,
    pub ttl: u64,
    pub retry: u64,
    pub force: bool,
    pub budget_ms: u64,
}

/// Format unix seconds as RFC 3339, falling back to the raw number for
/// timestamps chrono cannot represent.
#[must_use]
pub fn rfc3339(unix_secs: i64) -> String {
    chrono::DateTime::from_timestamp(unix_secs, 0)
        .map_or_else(|| unix_secs.to_string(), |dt| dt.to_rfc3339())
}
