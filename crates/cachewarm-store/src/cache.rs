//! Payload cache under the cache root.
//!
//! Payloads are stored raw at `<root>/<key>` so other processes can read them
//! directly. A sidecar `<key>.entry.json` records the status code and store
//! time; it is advisory, and a missing or mismatched sidecar falls back to the
//! payload's mtime with status 200.

use std::borrow::Cow;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use cachewarm_core::CacheKey;
use serde::{Deserialize, Serialize};

use crate::atomic::write_atomic;
use crate::error::StoreError;
use crate::meta::JobMeta;
use crate::sha256_hex;

const ENTRY_SUFFIX: &str = ".entry.json";
const META_SUFFIX: &str = ".meta.json";

/// One committed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub payload: Vec<u8>,
    pub status_code: u16,
    /// Unix seconds.
    pub stored_at: i64,
}

impl CacheEntry {
    /// Seconds since the entry was stored, never negative.
    #[must_use]
    pub fn age(&self, now: i64) -> u64 {
        u64::try_from(now.saturating_sub(self.stored_at)).unwrap_or(0)
    }

    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryRecord {
    status_code: u16,
    stored_at: i64,
    bytes: u64,
    sha256: String,
}

/// Filesystem-backed payload cache.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the payload for `key` lives.
    #[must_use]
    pub fn payload_path(&self, key: &CacheKey) -> PathBuf {
        key.resolve(&self.root)
    }

    fn sidecar_path(&self, key: &CacheKey, suffix: &str) -> PathBuf {
        self.root.join(format!("{}{suffix}", key.as_str()))
    }

    /// Read the entry for `key`, or `None` if nothing has been stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the payload exists but cannot be read.
    pub fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        let path = self.payload_path(key);
        let payload = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io("read", &path, e)),
        };

        let (status_code, stored_at) = match self.read_entry_record(key, &payload) {
            Some(record) => (record.status_code, record.stored_at),
            None => (200, mtime_secs(&path)?),
        };

        Ok(Some(CacheEntry {
            key: key.clone(),
            payload,
            status_code,
            stored_at,
        }))
    }

    /// Sidecar record, only if it describes exactly this payload.
    fn read_entry_record(&self, key: &CacheKey, payload: &[u8]) -> Option<EntryRecord> {
        let path = self.sidecar_path(key, ENTRY_SUFFIX);
        let raw = fs::read(&path).ok()?;
        let record: EntryRecord = match serde_json::from_slice(&raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable cache entry record");
                return None;
            }
        };
        let matches = record.bytes == payload.len() as u64 && record.sha256 == sha256_hex(payload);
        if !matches {
            tracing::debug!(cache_key = %key, "cache entry record does not match payload, using mtime");
        }
        matches.then_some(record)
    }

    /// Atomically store `payload` for `key`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the payload cannot be written. The
    /// previous entry, payload and sidecar, is left intact in that case.
    pub fn put(
        &self,
        key: &CacheKey,
        payload: &[u8],
        status_code: u16,
        now: i64,
    ) -> Result<CacheEntry, StoreError> {
        self.put_with(key, payload, status_code, now, write_atomic)
    }

    fn put_with<W>(
        &self,
        key: &CacheKey,
        payload: &[u8],
        status_code: u16,
        now: i64,
        write: W,
    ) -> Result<CacheEntry, StoreError>
    where
        W: Fn(&Path, &[u8]) -> Result<(), StoreError>,
    {
        write(&self.payload_path(key), payload)?;

        // Past this point the payload is committed. A stale sidecar no longer
        // matches it, so readers fall back to the mtime.
        let record = EntryRecord {
            status_code,
            stored_at: now,
            bytes: payload.len() as u64,
            sha256: sha256_hex(payload),
        };
        let sidecar = self.sidecar_path(key, ENTRY_SUFFIX);
        let written = serde_json::to_vec_pretty(&record)
            .map_err(|e| StoreError::Corrupt {
                path: sidecar.display().to_string(),
                reason: e.to_string(),
            })
            .and_then(|encoded| write(&sidecar, &encoded));
        if let Err(e) = written {
            tracing::warn!(cache_key = %key, error = %e, "failed to write cache entry record");
        }

        tracing::debug!(cache_key = %key, bytes = payload.len(), status_code, "cache entry stored");
        Ok(CacheEntry {
            key: key.clone(),
            payload: payload.to_vec(),
            status_code,
            stored_at: now,
        })
    }

    /// Age of the entry for `key` in seconds, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the payload exists but cannot be read.
    pub fn age(&self, key: &CacheKey, now: i64) -> Result<Option<u64>, StoreError> {
        Ok(self.get(key)?.map(|entry| entry.age(now)))
    }

    /// Write the metadata record for a job's last attempt.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the record cannot be encoded or written.
    pub fn write_meta(&self, key: &CacheKey, meta: &JobMeta) -> Result<(), StoreError> {
        let path = self.sidecar_path(key, META_SUFFIX);
        let encoded = serde_json::to_vec_pretty(meta).map_err(|e| StoreError::Corrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        write_atomic(&path, &encoded)
    }

    /// Read the metadata record for `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the record exists but is unreadable.
    pub fn read_meta(&self, key: &CacheKey) -> Result<Option<JobMeta>, StoreError> {
        let path = self.sidecar_path(key, META_SUFFIX);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io("read", &path, e)),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
    }
}

fn mtime_secs(path: &Path) -> Result<i64, StoreError> {
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

    fn key(raw: &str) -> CacheKey {
        CacheKey::parse(raw).unwrap()
    }

    #[test]
    fn absent_entry_is_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        assert!(store.get(&key("missing.json")).unwrap().is_none());
        assert_eq!(store.age(&key("missing.json"), 100).unwrap(), None);
    }

    #[test]
    fn put_then_get_preserves_status_and_time() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let k = key("rates/usd.json");

        store.put(&k, br#"{"usd":1}"#, 203, 1_000).unwrap();

        let entry = store.get(&k).unwrap().expect("entry stored");
        assert_eq!(entry.payload, br#"{"usd":1}"#);
        assert_eq!(entry.status_code, 203);
        assert_eq!(entry.stored_at, 1_000);
        assert_eq!(store.age(&k, 1_042).unwrap(), Some(42));
        assert_eq!(
            fs::read(dir.path().join("rates/usd.json")).unwrap(),
            br#"{"usd":1}"#
        );
    }

    #[test]
    fn externally_replaced_payload_falls_back_to_mtime() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let k = key("feed.json");
        store.put(&k, b"old", 201, 5).unwrap();

        fs::write(dir.path().join("feed.json"), b"replaced").unwrap();

        let entry = store.get(&k).unwrap().unwrap();
        assert_eq!(entry.payload, b"replaced");
        assert_eq!(entry.status_code, 200);
        assert!(entry.stored_at > 5, "mtime should be used, got {}", entry.stored_at);
    }

    #[test]
    fn failed_put_keeps_serving_the_previous_entry() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let k = key("feed.json");
        store.put(&k, b"old", 201, 5).unwrap();
        let before = store.get(&k).unwrap().unwrap();

        let payload_path = store.payload_path(&k);
        let result = store.put_with(&k, b"new", 200, 9, |path, contents| {
            if path == payload_path {
                return Err(StoreError::io(
                    "rename temp file onto",
                    path,
                    std::io::Error::other("disk full"),
                ));
            }
            write_atomic(path, contents)
        });
        assert!(result.is_err());

        let after = store.get(&k).unwrap().unwrap();
        assert_eq!(after.payload, b"old");
        assert_eq!(after.status_code, 201);
        assert_eq!(after.stored_at, 5);
        assert_eq!(after.stored_at, before.stored_at);
    }

    #[test]
    fn unwritable_entry_record_still_commits_the_payload() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let k = key("feed.json");
        store.put(&k, b"old", 201, 5).unwrap();

        // A non-empty directory cannot be renamed over.
        let sidecar = dir.path().join("feed.json.entry.json");
        fs::remove_file(&sidecar).unwrap();
        fs::create_dir_all(sidecar.join("child")).unwrap();

        let entry = store.put(&k, b"new", 203, 9).unwrap();
        assert_eq!(entry.stored_at, 9);

        let served = store.get(&k).unwrap().unwrap();
        assert_eq!(served.payload, b"new");
        assert_eq!(served.status_code, 200);
    }

    #[test]
    fn age_is_never_negative() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let entry = store.put(&key("x"), b"1", 200, 500).unwrap();
        assert_eq!(entry.age(400), 0);
    }

    #[test]
    fn meta_round_trips_next_to_payload() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = CacheStore::new(dir.path());
        let k = key("rates.json");
        let meta = JobMeta {
            generated_at: "2026-01-01T00:00:00+00:00".to_string(),
            name: "rates".to_string(),
            url: "https://example.com".to_string(),
            method: "GET".to_string(),
            http_code: 503,
            ok: false,
            bytes: 0,
            sha256: None,
            error: Some("HttpStatusError: 503".to_string()),
            duration_ms: 12,
            cache_key: k.to_string(),
            ttl: 300,
            retry: 15,
            force: false,
            budget_ms: 300,
        };

        store.write_meta(&k, &meta).unwrap();

        assert!(dir.path().join("rates.json.meta.json").exists());
        assert!(!dir.path().join("rates.json").exists());
        assert_eq!(store.read_meta(&k).unwrap(), Some(meta));
    }
}
