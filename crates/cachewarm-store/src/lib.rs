//! On-disk persistence for cache warming: payload entries, per-job state
//! markers, advisory locks and metadata records.

pub mod atomic;
pub mod cache;
pub mod error;
pub mod lock;
pub mod meta;
pub mod state;

use sha2::{Digest, Sha256};

pub use atomic::write_atomic;
pub use cache::{CacheEntry, CacheStore};
pub use error::StoreError;
pub use lock::{GlobalLock, JobLock, LockError};
pub use meta::{rfc3339, JobMeta};
pub use state::{JobState, StateStore};

/// Lowercase hex sha256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
