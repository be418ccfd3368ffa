//! Per-job scheduling state under the state root.
//!
//! Layout, with `<name>` the file-safe job name:
//!
//! | File                   | Contents                                  |
//! |------------------------|-------------------------------------------|
//! | `<name>.done`          | unix seconds of the last committed refresh |
//! | `<name>.attempt`       | unix seconds of the last attempt           |
//! | `<name>.backoff.json`  | failure count and backoff deadline         |
//! | `<name>.lock`          | per-job advisory lock                      |
//! | `_run/global.lock`     | run-wide advisory lock                     |
//! | `_run/cursor`          | rotating iteration cursor                  |
//!
//! Run-wide files live in a subdirectory so no job name can resolve to them.
//!
//! A marker whose contents are not a number (for example one created with
//! `touch`) is read from its mtime instead.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use cachewarm_core::safe_name;
use serde::{Deserialize, Serialize};

use crate::atomic::write_atomic;
use crate::error::StoreError;
use crate::lock::{FileLock, GlobalLock, JobLock, LockError};

const RUN_DIR: &str = "_run";
const GLOBAL_LOCK_FILE: &str = "global.lock";
const CURSOR_FILE: &str = "cursor";

/// Scheduling state of one job. All timestamps are unix seconds, `0` = never.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobState {
    /// Last successful commit. Only advanced on success.
    pub last_done: i64,
    /// Last attempt of any outcome.
    pub last_attempt: i64,
    /// Consecutive failures since the last success.
    pub fail_count: u32,
    pub backoff_until: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BackoffRecord {
    fail_count: u32,
    backoff_until: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_file(&self, file: &str) -> PathBuf {
        self.root.join(RUN_DIR).join(file)
    }

    fn job_file(&self, name: &str, suffix: &str) -> PathBuf {
        self.root.join(format!("{}{suffix}", safe_name(name)))
    }

    /// Current state of the job called `name`. Missing files read as "never".
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a state file exists but cannot be read.
    pub fn read(&self, name: &str) -> Result<JobState, StoreError> {
        let backoff = self.read_backoff(name)?;
        Ok(JobState {
            last_done: read_marker(&self.job_file(name, ".done"))?,
            last_attempt: read_marker(&self.job_file(name, ".attempt"))?,
            fail_count: backoff.fail_count,
            backoff_until: backoff.backoff_until,
        })
    }

    fn read_backoff(&self, name: &str) -> Result<BackoffRecord, StoreError> {
        let path = self.job_file(name, ".backoff.json");
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BackoffRecord::default()),
            Err(e) => return Err(StoreError::io("read", &path, e)),
        };
        match serde_json::from_slice(&raw) {
            Ok(record) => Ok(record),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding corrupt backoff record");
                Ok(BackoffRecord::default())
            }
        }
    }

    /// Record that an attempt started at `ts`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the marker cannot be written.
    pub fn record_attempt(&self, name: &str, ts: i64) -> Result<(), StoreError> {
        write_atomic(&self.job_file(name, ".attempt"), ts.to_string().as_bytes())
    }

    /// Record a committed refresh at `ts` and clear any failure backoff.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the marker cannot be written.
    pub fn record_success(&self, name: &str, ts: i64) -> Result<(), StoreError> {
        write_atomic(&self.job_file(name, ".done"), ts.to_string().as_bytes())?;
        let backoff = self.job_file(name, ".backoff.json");
        match fs::remove_file(&backoff) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io("remove", &backoff, e)),
        }
    }

    /// Persist a failure: the new consecutive failure count and the time
    /// before which the job must not be retried.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the record cannot be written.
    pub fn record_failure(
        &self,
        name: &str,
        fail_count: u32,
        backoff_until: i64,
        error: &str,
    ) -> Result<(), StoreError> {
        let path = self.job_file(name, ".backoff.json");
        let record = BackoffRecord {
            fail_count,
            backoff_until,
            last_error: Some(error.to_string()),
        };
        let encoded = serde_json::to_vec_pretty(&record).map_err(|e| StoreError::Corrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        write_atomic(&path, &encoded)
    }

    /// Try to take the run-wide lock without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Busy`] if another runner holds it.
    pub fn try_lock_global(&self) -> Result<GlobalLock, LockError> {
        FileLock::try_acquire(&self.run_file(GLOBAL_LOCK_FILE)).map(GlobalLock)
    }

    /// Try to take the lock for one job without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Busy`] if another runner holds it.
    pub fn try_lock_job(&self, name: &str) -> Result<JobLock, LockError> {
        FileLock::try_acquire(&self.job_file(name, ".lock")).map(JobLock)
    }

    /// Position of the rotating cursor, `0` if never written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the cursor file exists but cannot be read.
    pub fn read_cursor(&self) -> Result<usize, StoreError> {
        let path = self.run_file(CURSOR_FILE);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(raw.trim().parse().unwrap_or(0)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(StoreError::io("read", &path, e)),
        }
    }

    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the cursor cannot be written.
    pub fn write_cursor(&self, position: usize) -> Result<(), StoreError> {
        write_atomic(&self.run_file(CURSOR_FILE), position.to_string().as_bytes())
    }
}

fn read_marker(path: &Path) -> Result<i64, StoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(StoreError::io("read", path, e)),
    };
    if let Ok(ts) = raw.trim().parse::<i64>() {
        return Ok(ts);
    }
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| StoreError::io("stat", path, e))?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn unknown_job_reads_as_never_run() {
        let (_dir, store) = store();
        assert_eq!(store.read("rates").unwrap(), JobState::default());
    }

    #[test]
    fn attempt_and_success_are_tracked_separately() {
        let (_dir, store) = store();
        store.record_attempt("rates", 100).unwrap();
        assert_eq!(store.read("rates").unwrap().last_attempt, 100);
        assert_eq!(store.read("rates").unwrap().last_done, 0);

        store.record_success("rates", 101).unwrap();
        let state = store.read("rates").unwrap();
        assert_eq!(state.last_done, 101);
        assert_eq!(state.last_attempt, 100);
    }

    #[test]
    fn success_clears_backoff() {
        let (dir, store) = store();
        store.record_failure("rates", 3, 500, "HttpStatusError: 503").unwrap();
        let state = store.read("rates").unwrap();
        assert_eq!(state.fail_count, 3);
        assert_eq!(state.backoff_until, 500);

        store.record_success("rates", 600).unwrap();
        let state = store.read("rates").unwrap();
        assert_eq!(state.fail_count, 0);
        assert_eq!(state.backoff_until, 0);
        assert!(!dir.path().join("rates.backoff.json").exists());
    }

    #[test]
    fn names_are_made_file_safe() {
        let (dir, store) = store();
        store.record_attempt("fx rates/usd", 7).unwrap();
        assert!(dir.path().join("fx_rates_usd.attempt").exists());
        assert_eq!(store.read("fx rates/usd").unwrap().last_attempt, 7);
    }

    #[test]
    fn touched_marker_uses_mtime() {
        let (dir, store) = store();
        fs::write(dir.path().join("legacy.done"), b"").unwrap();
        assert!(store.read("legacy").unwrap().last_done > 1_577_836_800);
    }

    #[test]
    fn corrupt_backoff_record_is_ignored() {
        let (dir, store) = store();
        fs::write(dir.path().join("rates.backoff.json"), b"{not json").unwrap();
        assert_eq!(store.read("rates").unwrap().fail_count, 0);
    }

    #[test]
    fn cursor_defaults_to_zero_and_persists() {
        let (_dir, store) = store();
        assert_eq!(store.read_cursor().unwrap(), 0);
        store.write_cursor(4).unwrap();
        assert_eq!(store.read_cursor().unwrap(), 4);
    }

    #[test]
    fn job_lock_never_aliases_the_global_lock() {
        let (_dir, store) = store();
        let _global = store.try_lock_global().unwrap();
        for name in ["__global", "_run", "global", "_run/global"] {
            assert!(store.try_lock_job(name).is_ok(), "{name} should lock independently");
        }
    }

    #[test]
    fn job_named_cursor_does_not_touch_the_cursor() {
        let (_dir, store) = store();
        store.write_cursor(3).unwrap();
        store.record_success("cursor", 10).unwrap();
        store.record_success("__cursor", 10).unwrap();
        assert_eq!(store.read_cursor().unwrap(), 3);
    }
}
