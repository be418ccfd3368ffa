use std::time::Instant;

use cachewarm_core::AppConfig;

use crate::error::ClientError;
use crate::http::HttpFetcher;
use crate::object_store::{ObjectStoreFetcher, S3_SCHEME};
use crate::outcome::FetchOutcome;
use crate::request::FetchRequest;
use crate::Fetch;

/// Dispatches a request to the right transport by URL scheme.
#[derive(Debug, Clone)]
pub struct Fetcher {
    http: HttpFetcher,
    object_store: Option<ObjectStoreFetcher>,
}

impl Fetcher {
    #[must_use]
    pub fn new(http: HttpFetcher, object_store: Option<ObjectStoreFetcher>) -> Self {
        Self { http, object_store }
    }

    /// Build the transports described by the application config.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the HTTP client cannot be built or the
    /// configured object store endpoint is invalid.
    pub fn from_config(config: &AppConfig) -> Result<Self, ClientError> {
        let http = HttpFetcher::new(config.connect_timeout(), &config.user_agent)?;
        let object_store = config
            .s3_endpoint
            .as_deref()
            .map(|endpoint| ObjectStoreFetcher::new(http.clone(), endpoint, config.s3_path_style))
            .transpose()?;
        Ok(Self::new(http, object_store))
    }
}

impl Fetch for Fetcher {
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        if !request.url.starts_with(S3_SCHEME) {
            return self.http.fetch(request).await;
        }
        match &self.object_store {
            Some(store) => store.fetch(request).await,
            None => FetchOutcome::transport(
                format!(
                    "ObjectStoreNotConfigured: set CACHEWARM_S3_ENDPOINT to fetch {}",
                    request.url
                ),
                Instant::now(),
            ),
        }
    }
}
