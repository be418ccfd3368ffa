use cachewarm_fetch::FetchError;
use cachewarm_store::StoreError;
use thiserror::Error;

/// Why a job or cached fetch did not produce a committed payload.
///
/// `Display` strings are prefixed with the failure kind and are what reports
/// and metadata records carry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Failure {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("ValidationError: {0}")]
    Validation(String),

    /// Already prefixed by the store error's own `Display`.
    #[error("{0}")]
    Store(String),

    #[error("ConfigError: {0}")]
    Config(String),

    #[error("Panic: {0}")]
    Panic(String),
}

impl From<StoreError> for Failure {
    fn from(err: StoreError) -> Self {
        Failure::Store(err.to_string())
    }
}
