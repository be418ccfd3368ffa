//! Outcome of one run, serialized verbatim for trusted callers.

use std::path::PathBuf;

use cachewarm_core::IterationOrder;
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::gate::Trigger;

/// Why a job, or a whole run, was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Traffic sample missed.
    Probability,
    /// The trigger came from the warmer's own request.
    SelfTrigger,
    /// Another runner holds the global lock.
    Locked,
    /// The run's time budget was spent before this job.
    Budget,
    /// The cached payload is within its TTL.
    Fresh,
    /// Too soon after the last attempt, or inside a failure backoff.
    RetryWait,
    /// Another runner holds this job's lock.
    JobLocked,
}

impl SkipReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::Probability => "probability",
            SkipReason::SelfTrigger => "self_trigger",
            SkipReason::Locked => "locked",
            SkipReason::Budget => "budget",
            SkipReason::Fresh => "fresh",
            SkipReason::RetryWait => "retry_wait",
            SkipReason::JobLocked => "job_locked",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobStatus {
    Skipped { reason: SkipReason },
    Ok,
    Error { error: String },
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Skipped { reason } => write!(f, "skipped:{reason}"),
            JobStatus::Ok => write!(f, "ok"),
            JobStatus::Error { error } => write!(f, "error:{error}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub name: String,
    #[serde(flatten)]
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl JobReport {
    #[must_use]
    pub fn skipped(name: &str, reason: SkipReason) -> Self {
        Self::with_status(name, JobStatus::Skipped { reason })
    }

    #[must_use]
    pub fn error(name: &str, error: impl std::fmt::Display) -> Self {
        Self::with_status(
            name,
            JobStatus::Error {
                error: error.to_string(),
            },
        )
    }

    fn with_status(name: &str, status: JobStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
            cache_key: None,
            http_code: None,
            bytes: None,
            sha256: None,
            duration_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub trigger: Trigger,
    /// RFC 3339.
    pub started_at: String,
    pub force: bool,
    pub debug: bool,
    pub budget_ms: u64,
    pub elapsed_ms: u64,
    pub job_filter: Vec<String>,
    #[serde(serialize_with = "display")]
    pub iteration_order: IterationOrder,
    pub cache_dir: PathBuf,
    pub state_dir: PathBuf,
    /// Set when the whole run was skipped before any job was looked at.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
    /// Set when the run could not start, e.g. the job source failed to load.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub jobs: Vec<JobReport>,
}

impl RunReport {
    #[must_use]
    pub fn job(&self, name: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|j| j.name == name)
    }

    #[must_use]
    pub fn ok_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.status == JobStatus::Ok)
            .count()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| matches!(j.status, JobStatus::Error { .. }))
            .count()
    }

    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| matches!(j.status, JobStatus::Skipped { .. }))
            .count()
    }
}

fn display<T: std::fmt::Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}
