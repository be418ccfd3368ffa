use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Order in which a run walks the job list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOrder {
    /// Always start at the first job (batch/cron mode).
    List,
    /// Start at a persisted cursor and advance it past the last evaluated job.
    Rotating,
}

impl std::fmt::Display for IterationOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IterationOrder::List => write!(f, "list"),
            IterationOrder::Rotating => write!(f, "rotating"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub cache_dir: PathBuf,
    pub state_dir: PathBuf,
    pub jobs_file: PathBuf,
    pub probability: f64,
    pub budget_ms: u64,
    pub force_budget_multiplier: u64,
    pub timeout_secs: f64,
    pub connect_timeout_secs: f64,
    pub max_backoff_secs: u64,
    pub iteration_order: IterationOrder,
    pub user_agent: String,
    pub debug_remote: bool,
    pub debug_allowlist: Vec<IpAddr>,
    pub debug_token: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_path_style: bool,
    pub bind_addr: SocketAddr,
    pub cron: Option<String>,
    pub log_level: String,
}

impl AppConfig {
    /// Default per-fetch timeout for jobs that do not set their own.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(Duration::from_secs(30))
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.connect_timeout_secs).unwrap_or(Duration::from_secs(10))
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("cache_dir", &self.cache_dir)
            .field("state_dir", &self.state_dir)
            .field("jobs_file", &self.jobs_file)
            .field("probability", &self.probability)
            .field("budget_ms", &self.budget_ms)
            .field("force_budget_multiplier", &self.force_budget_multiplier)
            .field("timeout_secs", &self.timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("max_backoff_secs", &self.max_backoff_secs)
            .field("iteration_order", &self.iteration_order)
            .field("user_agent", &self.user_agent)
            .field("debug_remote", &self.debug_remote)
            .field("debug_allowlist", &self.debug_allowlist)
            .field(
                "debug_token",
                &self.debug_token.as_ref().map(|_| "[redacted]"),
            )
            .field("s3_endpoint", &self.s3_endpoint)
            .field("s3_path_style", &self.s3_path_style)
            .field("bind_addr", &self.bind_addr)
            .field("cron", &self.cron)
            .field("log_level", &self.log_level)
            .finish()
    }
}
