use thiserror::Error;

/// Why a fetch did not produce a usable 2xx response.
///
/// The `Display` form is prefixed with the error kind so it can be surfaced
/// verbatim in run reports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The remote was never reached: DNS, connect, TLS, timeout, bad URL.
    #[error("TransportError: {0}")]
    Transport(String),

    /// The remote answered with a non-2xx status.
    #[error("HttpStatusError: {status}")]
    HttpStatus { status: u16 },
}

impl FetchError {
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport(_))
    }
}

/// Failure while constructing a fetcher.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),

    #[error("invalid object store endpoint \"{endpoint}\": {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}
