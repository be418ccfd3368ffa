//! Cache-warming scheduler: cached fetch with stale fallback, the gate that
//! decides whether a trigger starts a run, and the lock-protected,
//! time-budgeted runner that refreshes jobs.

pub mod backoff;
pub mod cached_fetch;
pub mod error;
pub mod gate;
pub mod report;
pub mod runner;
pub mod validate;

pub use backoff::{backoff_secs, next_backoff_until};
pub use cached_fetch::{cached_fetch, CachedFetcher, CachedResponse};
pub use error::Failure;
pub use gate::{gate, FixedSampler, GateDecision, RandomSampler, Sampler, Trigger};
pub use report::{JobReport, JobStatus, RunReport, SkipReason};
pub use runner::{RunRequest, Runner, RunnerSettings};
pub use validate::validate;
