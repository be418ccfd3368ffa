use std::time::Duration;

use cachewarm_core::{Job, RequestBody};

/// One outbound request, transport-agnostic.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    /// Overall deadline for the request, including reading the body.
    pub timeout: Duration,
}

impl FetchRequest {
    /// A bare `GET` with no extra headers.
    #[must_use]
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout,
        }
    }

    /// Build the request for a job, falling back to `default_timeout` when the
    /// job does not set its own.
    #[must_use]
    pub fn for_job(job: &Job, default_timeout: Duration) -> Self {
        Self {
            method: job.method.clone(),
            url: job.url.clone(),
            headers: job.headers.clone(),
            body: job.body.clone(),
            timeout: job.timeout.unwrap_or(default_timeout),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Whether a body should be sent at all. `GET` and `HEAD` never carry one.
    #[must_use]
    pub fn sends_body(&self) -> bool {
        self.body.is_some()
            && !self.method.eq_ignore_ascii_case("GET")
            && !self.method.eq_ignore_ascii_case("HEAD")
    }
}
