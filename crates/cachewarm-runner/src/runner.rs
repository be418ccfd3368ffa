//! Run-to-completion warming runner.
//!
//! One run: gate, take the global lock, load the job list, then walk it
//! sequentially within the time budget. Each job is checked for freshness and
//! backoff, locked, fetched, validated, and committed only if every step
//! succeeded. Locks are guards, so they are released on every exit path,
//! including a panic inside a job.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cachewarm_core::{
    AppConfig, Clock, FileJobSource, IterationOrder, Job, JobEntry, JobSource, SystemClock,
};
use cachewarm_fetch::{ClientError, Fetch, FetchError, FetchOutcome, FetchRequest, Fetcher};
use cachewarm_store::{
    rfc3339, sha256_hex, CacheStore, JobMeta, JobState, LockError, StateStore,
};
use futures::FutureExt;
use uuid::Uuid;

use crate::backoff::next_backoff_until;
use crate::error::Failure;
use crate::gate::{gate, GateDecision, RandomSampler, Sampler, Trigger};
use crate::report::{JobReport, JobStatus, RunReport, SkipReason};
use crate::validate::validate;

/// Floor for an explicit budget override.
const MIN_BUDGET_MS: u64 = 50;

/// Parameters of one invocation.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub trigger: Trigger,
    /// Bypass sampling, freshness and backoff; multiply the budget.
    pub force: bool,
    /// Replaces the configured budget; floored at 50 ms.
    pub budget_override_ms: Option<u64>,
    /// Only run jobs with these names. Empty means all jobs.
    pub job_filter: Vec<String>,
    /// Caller asked for the full report.
    pub debug: bool,
    /// The triggering request carried the warmer's own marker header.
    pub self_triggered: bool,
}

impl RunRequest {
    #[must_use]
    pub fn new(trigger: Trigger) -> Self {
        Self {
            trigger,
            force: false,
            budget_override_ms: None,
            job_filter: Vec::new(),
            debug: false,
            self_triggered: false,
        }
    }

    #[must_use]
    pub fn manual() -> Self {
        Self::new(Trigger::Manual)
    }

    #[must_use]
    pub fn traffic() -> Self {
        Self::new(Trigger::Traffic)
    }

    #[must_use]
    pub fn cron() -> Self {
        Self::new(Trigger::Cron)
    }

    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    #[must_use]
    pub fn budget_ms(mut self, budget_ms: Option<u64>) -> Self {
        self.budget_override_ms = budget_ms;
        self
    }

    #[must_use]
    pub fn jobs(mut self, names: Vec<String>) -> Self {
        self.job_filter = names;
        self
    }
}

/// Tunables taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub probability: f64,
    pub budget_ms: u64,
    pub force_budget_multiplier: u64,
    /// Fetch deadline for jobs that do not set their own.
    pub default_timeout: Duration,
    pub max_backoff_secs: u64,
    pub iteration_order: IterationOrder,
}

impl RunnerSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            probability: config.probability,
            budget_ms: config.budget_ms,
            force_budget_multiplier: config.force_budget_multiplier,
            default_timeout: config.timeout(),
            max_backoff_secs: config.max_backoff_secs,
            iteration_order: config.iteration_order,
        }
    }

    /// Effective budget for `request`.
    #[must_use]
    pub fn budget_for(&self, request: &RunRequest) -> u64 {
        match request.budget_override_ms {
            Some(ms) => ms.max(MIN_BUDGET_MS),
            None if request.force => self
                .budget_ms
                .saturating_mul(self.force_budget_multiplier.max(1)),
            None => self.budget_ms,
        }
    }
}

pub struct Runner<F> {
    fetcher: F,
    source: Arc<dyn JobSource>,
    cache: CacheStore,
    state: StateStore,
    clock: Arc<dyn Clock>,
    sampler: Arc<dyn Sampler>,
    settings: RunnerSettings,
}

impl Runner<Fetcher> {
    /// Build a runner over the configured transports, job file and roots.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the fetch transports cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, ClientError> {
        Ok(Self::new(
            Fetcher::from_config(config)?,
            Arc::new(FileJobSource::new(&config.jobs_file)),
            CacheStore::new(&config.cache_dir),
            StateStore::new(&config.state_dir),
            RunnerSettings::from_config(config),
        ))
    }
}

impl<F: Fetch> Runner<F> {
    pub fn new(
        fetcher: F,
        source: Arc<dyn JobSource>,
        cache: CacheStore,
        state: StateStore,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            fetcher,
            source,
            cache,
            state,
            clock: Arc::new(SystemClock),
            sampler: Arc::new(RandomSampler),
            settings,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_sampler(mut self, sampler: Arc<dyn Sampler>) -> Self {
        self.sampler = sampler;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    #[must_use]
    pub fn state(&self) -> &StateStore {
        &self.state
    }

    #[must_use]
    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    #[must_use]
    pub fn source(&self) -> &dyn JobSource {
        self.source.as_ref()
    }

    /// Execute one run and report what happened to every job.
    pub async fn run(&self, request: &RunRequest) -> RunReport {
        let started = Instant::now();
        let budget_ms = self.settings.budget_for(request);
        let mut report = self.new_report(request, budget_ms);

        if let GateDecision::Skip(reason) = gate(
            request.trigger,
            request.force,
            request.self_triggered,
            self.settings.probability,
            self.sampler.as_ref(),
        ) {
            tracing::debug!(run_id = %report.run_id, %reason, "run skipped at gate");
            report.skipped = Some(reason);
            return report;
        }

        let _global = match self.state.try_lock_global() {
            Ok(lock) => lock,
            Err(LockError::Busy(path)) => {
                tracing::info!(run_id = %report.run_id, lock = %path, "another runner is active, skipping");
                report.skipped = Some(SkipReason::Locked);
                report.elapsed_ms = elapsed_ms(started);
                return report;
            }
            Err(LockError::Store(e)) => {
                tracing::error!(run_id = %report.run_id, error = %e, "failed to take global lock");
                report.error = Some(e.to_string());
                report.elapsed_ms = elapsed_ms(started);
                return report;
            }
        };

        let registry = match self.source.load() {
            Ok(registry) => registry.filtered(&request.job_filter),
            Err(e) => {
                tracing::error!(run_id = %report.run_id, source = %self.source.describe(), error = %e, "failed to load jobs");
                report.error = Some(Failure::Config(e.to_string()).to_string());
                report.elapsed_ms = elapsed_ms(started);
                return report;
            }
        };
        let entries = registry.entries();

        tracing::info!(
            run_id = %report.run_id,
            trigger = %request.trigger,
            force = request.force,
            debug = request.debug,
            budget_ms,
            jobs = entries.len(),
            "warm run started"
        );

        // The cursor indexes the full registry; a filtered run walks in list order.
        let rotating = self.settings.iteration_order == IterationOrder::Rotating
            && request.job_filter.is_empty();
        let order = self.iteration_order(entries.len(), rotating);
        let mut last_evaluated = None;
        for (pos, &index) in order.iter().enumerate() {
            if elapsed_ms(started) > budget_ms {
                for &rest in &order[pos..] {
                    report
                        .jobs
                        .push(JobReport::skipped(entries[rest].name(), SkipReason::Budget));
                }
                tracing::info!(
                    run_id = %report.run_id,
                    remaining = order.len() - pos,
                    "budget spent, skipping remaining jobs"
                );
                break;
            }

            let job_report = match &entries[index] {
                JobEntry::Rejected(rejected) => {
                    tracing::warn!(job = %rejected.name, reason = %rejected.reason, "job rejected at load");
                    JobReport::error(&rejected.name, Failure::Config(rejected.reason.clone()))
                }
                JobEntry::Ready(job) => self.run_job_isolated(job, request, budget_ms).await,
            };
            report.jobs.push(job_report);
            last_evaluated = Some(index);
        }

        if rotating {
            if let Some(index) = last_evaluated {
                if let Err(e) = self.state.write_cursor((index + 1) % entries.len()) {
                    tracing::warn!(error = %e, "failed to persist iteration cursor");
                }
            }
        }

        report.elapsed_ms = elapsed_ms(started);
        tracing::info!(
            run_id = %report.run_id,
            ok = report.ok_count(),
            errors = report.error_count(),
            skipped = report.skipped_count(),
            elapsed_ms = report.elapsed_ms,
            "warm run finished"
        );
        report
    }

    fn new_report(&self, request: &RunRequest, budget_ms: u64) -> RunReport {
        RunReport {
            run_id: Uuid::new_v4(),
            trigger: request.trigger,
            started_at: rfc3339(self.clock.now()),
            force: request.force,
            debug: request.debug,
            budget_ms,
            elapsed_ms: 0,
            job_filter: request.job_filter.clone(),
            iteration_order: self.settings.iteration_order,
            cache_dir: self.cache.root().to_path_buf(),
            state_dir: self.state.root().to_path_buf(),
            skipped: None,
            error: None,
            jobs: Vec::new(),
        }
    }

    /// Indices of `len` entries in evaluation order.
    fn iteration_order(&self, len: usize, rotating: bool) -> Vec<usize> {
        if len == 0 {
            return Vec::new();
        }
        let start = if rotating {
            match self.state.read_cursor() {
                Ok(cursor) => cursor % len,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read iteration cursor, starting at 0");
                    0
                }
            }
        } else {
            0
        };
        (start..len).chain(0..start).collect()
    }

    async fn run_job_isolated(&self, job: &Job, request: &RunRequest, budget_ms: u64) -> JobReport {
        match AssertUnwindSafe(self.run_job(job, request, budget_ms))
            .catch_unwind()
            .await
        {
            Ok(report) => report,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(job = %job.name, panic = %message, "job panicked");
                let mut report = JobReport::error(&job.name, Failure::Panic(message));
                report.cache_key = Some(job.cache_key.to_string());
                report
            }
        }
    }

    async fn run_job(&self, job: &Job, request: &RunRequest, budget_ms: u64) -> JobReport {
        let now = self.clock.now();
        let fail = |failure: Failure| {
            let mut report = JobReport::error(&job.name, failure);
            report.cache_key = Some(job.cache_key.to_string());
            report
        };
        let skip = |reason: SkipReason| {
            tracing::debug!(job = %job.name, %reason, "job skipped");
            let mut report = JobReport::skipped(&job.name, reason);
            report.cache_key = Some(job.cache_key.to_string());
            report
        };

        // The default state root sits inside the cache root.
        if self.cache.payload_path(&job.cache_key).starts_with(self.state.root()) {
            return fail(Failure::Config(format!(
                "cache_key {} resolves inside the state directory",
                job.cache_key
            )));
        }

        let state = match self.state.read(&job.name) {
            Ok(state) => state,
            Err(e) => return fail(e.into()),
        };
        if let Some(reason) = schedule_skip(job, &state, now, request.force) {
            return skip(reason);
        }

        let _lock = match self.state.try_lock_job(&job.name) {
            Ok(lock) => lock,
            Err(LockError::Busy(_)) => return skip(SkipReason::JobLocked),
            Err(LockError::Store(e)) => return fail(e.into()),
        };
        if let Err(e) = self.state.record_attempt(&job.name, now) {
            return fail(e.into());
        }

        let fetch_request = FetchRequest::for_job(job, self.settings.default_timeout);
        let outcome = self.fetcher.fetch(&fetch_request).await;
        let finished = self.clock.now();

        let result = self.commit(job, &outcome, finished);
        if let Err(failure) = &result {
            self.record_failure(job, &state, finished, failure);
        }

        let sha256 = (!outcome.body.is_empty()).then(|| sha256_hex(&outcome.body));
        let meta = JobMeta {
            generated_at: rfc3339(finished),
            name: job.name.clone(),
            url: job.url.clone(),
            method: job.method.clone(),
            http_code: outcome.status_code,
            ok: result.is_ok(),
            bytes: outcome.body.len() as u64,
            sha256: sha256.clone(),
            error: result.as_ref().err().map(ToString::to_string),
            duration_ms: outcome.duration_ms,
            cache_key: job.cache_key.to_string(),
            ttl: job.ttl_secs,
            retry: job.retry_secs,
            force: request.force,
            budget_ms,
        };
        if let Err(e) = self.cache.write_meta(&job.cache_key, &meta) {
            tracing::warn!(job = %job.name, error = %e, "failed to write job metadata");
        }

        let status = match result {
            Ok(()) => {
                tracing::info!(
                    job = %job.name,
                    cache_key = %job.cache_key,
                    status = outcome.status_code,
                    bytes = meta.bytes,
                    duration_ms = outcome.duration_ms,
                    "job refreshed"
                );
                JobStatus::Ok
            }
            Err(failure) => {
                tracing::warn!(
                    job = %job.name,
                    cache_key = %job.cache_key,
                    status = outcome.status_code,
                    duration_ms = outcome.duration_ms,
                    error = %failure,
                    "job refresh failed"
                );
                JobStatus::Error {
                    error: failure.to_string(),
                }
            }
        };

        JobReport {
            name: job.name.clone(),
            status,
            cache_key: Some(job.cache_key.to_string()),
            http_code: Some(outcome.status_code),
            bytes: Some(meta.bytes),
            sha256,
            duration_ms: Some(outcome.duration_ms),
        }
    }

    /// Validate and commit a fetch. Nothing is written unless every check passes.
    fn commit(&self, job: &Job, outcome: &FetchOutcome, now: i64) -> Result<(), Failure> {
        if !outcome.ok {
            let err = outcome.error.clone().unwrap_or(FetchError::HttpStatus {
                status: outcome.status_code,
            });
            return Err(err.into());
        }
        validate(&outcome.body, job.format, &job.test)?;
        self.cache
            .put(&job.cache_key, &outcome.body, outcome.status_code, now)?;
        self.state.record_success(&job.name, now)?;
        Ok(())
    }

    fn record_failure(&self, job: &Job, state: &JobState, now: i64, failure: &Failure) {
        let fail_count = state.fail_count.saturating_add(1);
        let backoff_until =
            next_backoff_until(now, job.retry_secs, fail_count, self.settings.max_backoff_secs);
        if let Err(e) =
            self.state
                .record_failure(&job.name, fail_count, backoff_until, &failure.to_string())
        {
            tracing::warn!(job = %job.name, error = %e, "failed to persist backoff");
        }
    }
}

/// Why a job should not be attempted yet, if at all.
fn schedule_skip(job: &Job, state: &JobState, now: i64, force: bool) -> Option<SkipReason> {
    if force {
        return None;
    }
    let ttl = i64::try_from(job.ttl_secs).unwrap_or(i64::MAX);
    if state.last_done > 0 && now.saturating_sub(state.last_done) < ttl {
        return Some(SkipReason::Fresh);
    }
    let retry = i64::try_from(job.retry_secs).unwrap_or(i64::MAX);
    let too_soon = state.last_attempt > 0 && now.saturating_sub(state.last_attempt) < retry;
    if too_soon || now < state.backoff_until {
        return Some(SkipReason::RetryWait);
    }
    None
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
