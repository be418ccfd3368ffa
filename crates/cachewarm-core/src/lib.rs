pub mod app_config;
pub mod clock;
pub mod config;
pub mod jobs;

use thiserror::Error;

pub use app_config::{AppConfig, IterationOrder};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_app_config, load_app_config_from_env};
pub use jobs::{
    load_jobs, parse_jobs, safe_name, CacheKey, ContentFormat, FileJobSource, Job, JobEntry,
    JobRegistry, JobSource, RejectedJob, RequestBody, ResponseTest, SourceFormat,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read job source {path}: {source}")]
    JobSourceIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse job source {path}: {reason}")]
    JobSourceParse { path: String, reason: String },

    #[error("invalid cache key \"{key}\": {reason}")]
    InvalidCacheKey { key: String, reason: String },

    #[error("invalid test predicate: {0}")]
    InvalidPredicate(String),
}
