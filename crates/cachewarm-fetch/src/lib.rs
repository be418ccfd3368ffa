//! Transport layer for cache warming: performs one request and reports a
//! uniform [`FetchOutcome`], never panicking and never returning early with
//! an error.

pub mod error;
pub mod http;
pub mod object_store;
pub mod outcome;
pub mod request;
pub mod router;

use std::future::Future;

pub use error::{ClientError, FetchError};
pub use http::HttpFetcher;
pub use object_store::ObjectStoreFetcher;
pub use outcome::FetchOutcome;
pub use request::FetchRequest;
pub use router::Fetcher;

/// Header stamped on every warming request so the warmer never re-triggers
/// itself when it fetches from its own host.
pub const WARM_HEADER: &str = "X-Cache-Warm";

/// Something that can execute a [`FetchRequest`].
///
/// Implementations must fold every failure into the returned outcome.
pub trait Fetch: Send + Sync {
    fn fetch(&self, request: &FetchRequest) -> impl Future<Output = FetchOutcome> + Send;
}
