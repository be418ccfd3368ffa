//! HTTP(S) transport built on `reqwest`.

use std::collections::HashSet;
use std::error::Error as _;
use std::time::{Duration, Instant};

use cachewarm_core::RequestBody;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Client, Method};

use crate::error::ClientError;
use crate::outcome::FetchOutcome;
use crate::request::FetchRequest;
use crate::Fetch;

/// Fetches plain HTTP(S) URLs.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher with the given connect timeout and `User-Agent`.
    ///
    /// The overall deadline is per request ([`FetchRequest::timeout`]).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Build`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(connect_timeout: Duration, user_agent: &str) -> Result<Self, ClientError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    /// Defaults first; a job header replaces a default of the same name, and
    /// repeated job headers are all sent.
    fn build_headers(request: &FetchRequest) -> Result<HeaderMap, String> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-cache-warm"),
            HeaderValue::from_static("1"),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut seen = HashSet::new();
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| format!("invalid header name {name:?}: {e}"))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| format!("invalid value for header {name}: {e}"))?;
            if seen.insert(name.clone()) {
                headers.insert(name, value);
            } else {
                headers.append(name, value);
            }
        }
        Ok(headers)
    }

    async fn execute(&self, request: &FetchRequest) -> Result<(u16, Vec<u8>), String> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| format!("invalid method {:?}: {e}", request.method))?;
        let headers = Self::build_headers(request)?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);

        if request.sends_body() {
            match &request.body {
                Some(RequestBody::Raw(raw)) => builder = builder.body(raw.clone()),
                // Sets the form content type; a job Content-Type header wins below.
                Some(RequestBody::Form(pairs)) => builder = builder.form(pairs),
                None => {}
            }
        }

        let response = builder
            .headers(headers)
            .send()
            .await
            .map_err(|e| describe(&e))?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| describe(&e))?;
        Ok((status, body.to_vec()))
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let started = Instant::now();
        let outcome = match self.execute(request).await {
            Ok((status, body)) => FetchOutcome::response(status, body, started),
            Err(reason) => FetchOutcome::transport(reason, started),
        };
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status = outcome.status_code,
            duration_ms = outcome.duration_ms,
            ok = outcome.ok,
            "fetch finished"
        );
        outcome
    }
}

/// Render a `reqwest` error with its kind and innermost cause, which is
/// usually the actionable part (`connection refused`, `dns error`, ...).
fn describe(err: &reqwest::Error) -> String {
    let kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else if err.is_builder() {
        "invalid request"
    } else if err.is_redirect() {
        "redirect"
    } else if err.is_body() || err.is_decode() {
        "body"
    } else {
        "request"
    };

    let mut root = err.source();
    while let Some(next) = root.and_then(std::error::Error::source) {
        root = Some(next);
    }
    match root {
        Some(cause) => format!("{kind}: {err} ({cause})"),
        None => format!("{kind}: {err}"),
    }
}
