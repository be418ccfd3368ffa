//! Declarative warming jobs: loading, normalization, and structural validation.
//!
//! Loading never performs network I/O. A malformed job is recorded as a
//! [`RejectedJob`] with a reason instead of aborting the whole load, so one bad
//! entry cannot stop the rest of the registry from being warmed.

mod cache_key;
mod predicate;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ConfigError;

pub use cache_key::CacheKey;
pub use predicate::ResponseTest;

const DEFAULT_NAME: &str = "job";
const DEFAULT_METHOD: &str = "GET";
const DEFAULT_TTL_SECS: i64 = 300;
const DEFAULT_RETRY_SECS: i64 = 15;

/// Declared content kind of a job's response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    /// Body must parse as JSON.
    #[default]
    Json,
    /// Body must be non-empty text.
    Text,
}

/// Request body sent with a job's fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Raw(String),
    /// Sent as `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
}

/// One validated warming job. Immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    pub ttl_secs: u64,
    pub retry_secs: u64,
    pub timeout: Option<Duration>,
    pub cache_key: CacheKey,
    pub test: ResponseTest,
    pub format: ContentFormat,
}

impl Job {
    /// File-safe form of the job name, used for per-job state files.
    #[must_use]
    pub fn state_name(&self) -> String {
        safe_name(&self.name)
    }
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`.
#[must_use]
pub fn safe_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// A job descriptor that failed structural validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedJob {
    /// Position in the source list.
    pub index: usize,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub enum JobEntry {
    Ready(Job),
    Rejected(RejectedJob),
}

impl JobEntry {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            JobEntry::Ready(job) => &job.name,
            JobEntry::Rejected(rejected) => &rejected.name,
        }
    }
}

/// Ordered result of loading a job source.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    entries: Vec<JobEntry>,
}

impl JobRegistry {
    #[must_use]
    pub fn new(entries: Vec<JobEntry>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[JobEntry] {
        &self.entries
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.entries.iter().filter_map(|e| match e {
            JobEntry::Ready(job) => Some(job),
            JobEntry::Rejected(_) => None,
        })
    }

    pub fn rejected(&self) -> impl Iterator<Item = &RejectedJob> {
        self.entries.iter().filter_map(|e| match e {
            JobEntry::Rejected(r) => Some(r),
            JobEntry::Ready(_) => None,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep only entries whose name is in `names`. An empty filter keeps everything.
    #[must_use]
    pub fn filtered(self, names: &[String]) -> Self {
        if names.is_empty() {
            return self;
        }
        let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
        Self {
            entries: self
                .entries
                .into_iter()
                .filter(|e| wanted.contains(e.name()))
                .collect(),
        }
    }
}

/// Where a job list comes from.
pub trait JobSource: Send + Sync {
    /// Load and validate the job list.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the source as a whole is unreadable or
    /// unparseable. Individual bad jobs are reported as [`JobEntry::Rejected`].
    fn load(&self) -> Result<JobRegistry, ConfigError>;

    /// Human-readable location, for reports and logs.
    fn describe(&self) -> String;
}

/// Serialization of a job source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Json,
    Yaml,
}

impl SourceFormat {
    /// `.yaml`/`.yml` files are YAML; everything else is JSON.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => SourceFormat::Yaml,
            _ => SourceFormat::Json,
        }
    }
}

/// A job list stored in a JSON or YAML file.
#[derive(Debug, Clone)]
pub struct FileJobSource {
    path: PathBuf,
}

impl FileJobSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl JobSource for FileJobSource {
    fn load(&self) -> Result<JobRegistry, ConfigError> {
        load_jobs(&self.path)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Load and validate a job file.
///
/// # Errors
///
/// Returns [`ConfigError::JobSourceIo`] if the file cannot be read and
/// [`ConfigError::JobSourceParse`] if it is not a job list.
pub fn load_jobs(path: &Path) -> Result<JobRegistry, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::JobSourceIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_jobs(&content, SourceFormat::from_path(path)).map_err(|e| match e {
        ConfigError::JobSourceParse { reason, .. } => ConfigError::JobSourceParse {
            path: path.display().to_string(),
            reason,
        },
        other => other,
    })
}

/// Parse a job list from text.
///
/// Accepts a bare list or an object wrapping the list under `jobs`.
///
/// # Errors
///
/// Returns [`ConfigError::JobSourceParse`] if the text is not a job list.
pub fn parse_jobs(content: &str, format: SourceFormat) -> Result<JobRegistry, ConfigError> {
    let parse_err = |reason: String| ConfigError::JobSourceParse {
        path: "<inline>".to_string(),
        reason,
    };

    let document: Value = match format {
        SourceFormat::Json => serde_json::from_str(content).map_err(|e| parse_err(e.to_string()))?,
        SourceFormat::Yaml => serde_yaml::from_str(content).map_err(|e| parse_err(e.to_string()))?,
    };

    let list = match document {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("jobs") {
            Some(Value::Array(items)) => items,
            _ => return Err(parse_err("expected a list or an object with a \"jobs\" list".into())),
        },
        _ => return Err(parse_err("expected a list or an object with a \"jobs\" list".into())),
    };

    let mut seen = HashSet::new();
    let entries = list
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            let name = value
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_NAME)
                .to_string();
            let entry = normalize_job(value).and_then(|job| {
                if seen.insert(job.state_name()) {
                    Ok(job)
                } else {
                    Err(format!(
                        "duplicate job name '{}' (state file '{}' already in use)",
                        job.name,
                        job.state_name()
                    ))
                }
            });
            match entry {
                Ok(job) => JobEntry::Ready(job),
                Err(reason) => JobEntry::Rejected(RejectedJob {
                    index,
                    name,
                    reason,
                }),
            }
        })
        .collect();

    Ok(JobRegistry::new(entries))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawHeaders {
    Map(BTreeMap<String, String>),
    Lines(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTest {
    Contains(String),
    Object {
        contains: Option<String>,
        regex: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct RawJob {
    name: Option<String>,
    url: Option<String>,
    method: Option<String>,
    headers: Option<RawHeaders>,
    body: Option<Value>,
    ttl: Option<i64>,
    retry: Option<i64>,
    timeout: Option<f64>,
    #[serde(alias = "cacheKey", alias = "cache_file")]
    cache_key: Option<String>,
    test: Option<RawTest>,
    format: Option<ContentFormat>,
}

fn normalize_job(value: Value) -> Result<Job, String> {
    if !value.is_object() {
        return Err("job entry is not an object".to_string());
    }
    let raw: RawJob = serde_json::from_value(value).map_err(|e| format!("malformed job: {e}"))?;

    let url = raw
        .url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| "missing url".to_string())?;

    let cache_key = raw
        .cache_key
        .as_deref()
        .ok_or_else(|| "missing cache_key".to_string())
        .and_then(|k| CacheKey::parse(k).map_err(|e| e.to_string()))?;

    let method = raw
        .method
        .as_deref()
        .unwrap_or(DEFAULT_METHOD)
        .trim()
        .to_ascii_uppercase();
    if method.is_empty() || !method.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(format!("invalid method {method:?}"));
    }

    let headers = match raw.headers {
        None => Vec::new(),
        Some(RawHeaders::Map(map)) => map.into_iter().collect(),
        Some(RawHeaders::Lines(lines)) => lines
            .iter()
            .map(|line| {
                line.split_once(':')
                    .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                    .filter(|(k, _)| !k.is_empty())
                    .ok_or_else(|| format!("header line {line:?} is not \"Name: value\""))
            })
            .collect::<Result<Vec<_>, _>>()?,
    };

    let body = match raw.body {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(RequestBody::Raw(s)),
        Some(Value::Object(map)) => Some(RequestBody::Form(
            map.into_iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => s,
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    (k, v)
                })
                .collect(),
        )),
        Some(other) => Some(RequestBody::Raw(other.to_string())),
    };

    let timeout = match raw.timeout {
        None => None,
        Some(secs) if secs.is_finite() && secs > 0.0 => Some(
            Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid timeout {secs}: {e}"))?,
        ),
        Some(secs) => return Err(format!("invalid timeout {secs}")),
    };

    let test = match raw.test {
        None => ResponseTest::None,
        Some(RawTest::Contains(s)) if s.is_empty() => ResponseTest::None,
        Some(RawTest::Contains(s)) => ResponseTest::Contains(s),
        Some(RawTest::Object {
            contains: Some(s), ..
        }) => {
            if s.is_empty() {
                ResponseTest::None
            } else {
                ResponseTest::Contains(s)
            }
        }
        Some(RawTest::Object {
            regex: Some(re), ..
        }) => {
            if re.is_empty() {
                ResponseTest::None
            } else {
                ResponseTest::regex(&re).map_err(|e| e.to_string())?
            }
        }
        Some(RawTest::Object { .. }) => {
            return Err("test must be a string, {\"contains\": ...} or {\"regex\": ...}".into())
        }
    };

    Ok(Job {
        name: raw
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_NAME.to_string()),
        url,
        method,
        headers,
        body,
        ttl_secs: clamp_secs(raw.ttl.unwrap_or(DEFAULT_TTL_SECS)),
        retry_secs: clamp_secs(raw.retry.unwrap_or(DEFAULT_RETRY_SECS)),
        timeout,
        cache_key,
        test,
        format: raw.format.unwrap_or_default(),
    })
}

fn clamp_secs(secs: i64) -> u64 {
    u64::try_from(secs.max(1)).unwrap_or(1)
}
