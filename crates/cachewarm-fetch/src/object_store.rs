//! Unsigned reads from an S3-compatible object store.
//!
//! `s3://bucket/key` is rewritten to an HTTP(S) URL on the configured
//! endpoint and fetched with a plain `GET`. Buckets must allow anonymous
//! reads or sit behind a gateway that signs on the caller's behalf.

use std::time::Instant;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::Url;

use crate::error::ClientError;
use crate::http::HttpFetcher;
use crate::outcome::FetchOutcome;
use crate::request::FetchRequest;
use crate::Fetch;

pub const S3_SCHEME: &str = "s3://";

/// Characters escaped in object-key path segments. `/` is kept so nested keys
/// map onto path segments.
const OBJECT_KEY: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// A parsed `s3://bucket/key` location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    /// Parse an `s3://` URL. Returns a reason string on failure.
    ///
    /// # Errors
    ///
    /// Fails if the scheme is wrong or the bucket or key is empty.
    pub fn parse(url: &str) -> Result<Self, String> {
        let rest = url
            .strip_prefix(S3_SCHEME)
            .ok_or_else(|| format!("InvalidS3Url: {url} does not start with {S3_SCHEME}"))?;
        let (bucket, key) = rest
            .split_once('/')
            .ok_or_else(|| format!("InvalidS3Url: {url} has no object key"))?;
        if bucket.is_empty() {
            return Err(format!("InvalidS3Url: {url} has no bucket"));
        }
        if key.is_empty() {
            return Err(format!("InvalidS3Url: {url} has no object key"));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

/// Fetches `s3://` URLs by translating them to unsigned HTTP requests.
#[derive(Debug, Clone)]
pub struct ObjectStoreFetcher {
    http: HttpFetcher,
    endpoint: Url,
    path_style: bool,
}

impl ObjectStoreFetcher {
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidEndpoint`] if `endpoint` is not an
    /// absolute `http`/`https` URL with a host.
    pub fn new(http: HttpFetcher, endpoint: &str, path_style: bool) -> Result<Self, ClientError> {
        let invalid = |reason: String| ClientError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason,
        };
        let parsed = Url::parse(endpoint.trim_end_matches('/')).map_err(|e| invalid(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", parsed.scheme())));
        }
        if parsed.host_str().is_none() {
            return Err(invalid("missing host".to_string()));
        }
        Ok(Self {
            http,
            endpoint: parsed,
            path_style,
        })
    }

    /// Resolve an object location to the HTTP URL that serves it.
    ///
    /// Path style yields `<endpoint>/<bucket>/<key>`, virtual-hosted style
    /// yields `<scheme>://<bucket>.<host>/<key>`.
    ///
    /// # Errors
    ///
    /// Returns a reason string if the resulting URL is not valid.
    pub fn object_url(&self, location: &ObjectLocation) -> Result<Url, String> {
        let key = utf8_percent_encode(&location.key, OBJECT_KEY).to_string();
        let base = self.endpoint.as_str().trim_end_matches('/');
        let raw = if self.path_style {
            format!("{base}/{}/{key}", location.bucket)
        } else {
            let host = self.endpoint.host_str().unwrap_or_default();
            let port = self
                .endpoint
                .port()
                .map(|p| format!(":{p}"))
                .unwrap_or_default();
            let prefix = self.endpoint.path().trim_end_matches('/');
            format!(
                "{}://{}.{host}{port}{prefix}/{key}",
                self.endpoint.scheme(),
                location.bucket
            )
        };
        Url::parse(&raw).map_err(|e| format!("InvalidS3Url: {raw}: {e}"))
    }
}

impl Fetch for ObjectStoreFetcher {
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let started = Instant::now();
        let url = match ObjectLocation::parse(&request.url).and_then(|loc| self.object_url(&loc)) {
            Ok(url) => url,
            Err(reason) => return FetchOutcome::transport(reason, started),
        };
        tracing::debug!(object = %request.url, url = %url, "resolved object store url");

        let translated = FetchRequest {
            method: "GET".to_string(),
            url: url.to_string(),
            headers: request.headers.clone(),
            body: None,
            timeout: request.timeout,
        };
        self.http.fetch(&translated).await
    }
}
