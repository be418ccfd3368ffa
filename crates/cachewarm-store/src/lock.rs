//! Advisory, non-blocking file locks.
//!
//! Locks are `flock`-style: held for the life of the guard, released on drop,
//! and released by the OS if the process dies. They only exclude other
//! cooperating runners.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

use crate::error::StoreError;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("LockBusy: {0} is held by another runner")]
    Busy(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug)]
pub(crate) struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    pub(crate) fn try_acquire(path: &Path) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io("create directory", parent, e))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StoreError::io("open lock file", path, e))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Self {
                file,
                path: path.to_path_buf(),
            }),
            Err(e) if is_contended(&e) => Err(LockError::Busy(path.display().to_string())),
            Err(e) => Err(StoreError::io("lock", path, e).into()),
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release lock");
        }
    }
}

/// Guard for the run-wide lock.
#[derive(Debug)]
pub struct GlobalLock(pub(crate) FileLock);

/// Guard for one job's lock.
#[derive(Debug)]
pub struct JobLock(pub(crate) FileLock);

impl GlobalLock {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0.path
    }
}

impl JobLock {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0.path
    }
}
