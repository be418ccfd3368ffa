//! Validated identifiers for payload entries under the cache root.

use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

use super::predicate::ResponseTest;
use crate::ConfigError;

/// File suffixes the cache store uses for its own sidecar files.
const RESERVED_SUFFIXES: [&str; 3] = [".meta.json", ".entry.json", ".tmp"];

/// A relative path that is guaranteed to resolve inside the cache root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Validate a caller-supplied cache key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCacheKey`] if the key is empty, absolute,
    /// contains a `..` component, a backslash, a NUL byte, a drive prefix, or
    /// collides with a sidecar suffix.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let reject = |reason: &str| ConfigError::InvalidCacheKey {
            key: raw.to_string(),
            reason: reason.to_string(),
        };

        if raw.trim().is_empty() {
            return Err(reject("must not be empty"));
        }
        if raw.contains('\\') {
            return Err(reject("must not contain backslashes"));
        }
        if raw.contains('\0') {
            return Err(reject("must not contain NUL bytes"));
        }
        if raw.starts_with('/') {
            return Err(reject("must be a relative path"));
        }
        if raw.ends_with('/') {
            return Err(reject("must name a file, not a directory"));
        }
        let bytes = raw.as_bytes();
        if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            return Err(reject("must not carry a drive prefix"));
        }
        for component in Path::new(raw).components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => return Err(reject("must not contain '..'")),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(reject("must be a relative path"))
                }
            }
        }
        if RESERVED_SUFFIXES.iter().any(|s| raw.ends_with(s)) {
            return Err(reject("uses a suffix reserved for cache sidecar files"));
        }

        Ok(Self(raw.to_string()))
    }

    /// Derive a key from a request URL and its validation predicate, for
    /// foreground lookups that have no explicit key.
    #[must_use]
    pub fn derived(url: &str, test: &ResponseTest) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hasher.update([0u8]);
        hasher.update(test.describe().as_bytes());
        Self(format!("{:x}.cache", hasher.finalize()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join this key onto `root`.
    #[must_use]
    pub fn resolve(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(raw: &str) -> String {
        match CacheKey::parse(raw) {
            Err(ConfigError::InvalidCacheKey { reason, .. }) => reason,
            other => panic!("expected InvalidCacheKey for {raw:?}, got {other:?}"),
        }
    }

    #[test]
    fn accepts_nested_relative_paths() {
        let key = CacheKey::parse("rates/usd.json").unwrap();
        assert_eq!(key.as_str(), "rates/usd.json");
        assert_eq!(
            key.resolve(Path::new("/var/cache")),
            PathBuf::from("/var/cache/rates/usd.json")
        );
    }

    #[test]
    fn rejects_path_traversal() {
        assert_eq!(reason("../../etc/passwd"), "must not contain '..'");
        assert_eq!(reason("a/../../b"), "must not contain '..'");
    }

    #[test]
    fn rejects_absolute_and_windows_paths() {
        assert_eq!(reason("/etc/passwd"), "must be a relative path");
        assert_eq!(reason("C:/temp/x"), "must not carry a drive prefix");
        assert_eq!(reason("a\\b"), "must not contain backslashes");
    }

    #[test]
    fn rejects_empty_and_directory_keys() {
        assert_eq!(reason(""), "must not be empty");
        assert_eq!(reason("   "), "must not be empty");
        assert_eq!(reason("rates/"), "must name a file, not a directory");
    }

    #[test]
    fn rejects_sidecar_suffixes() {
        assert!(CacheKey::parse("rates.meta.json").is_err());
        assert!(CacheKey::parse("rates.entry.json").is_err());
    }

    #[test]
    fn dots_inside_a_file_name_are_allowed() {
        assert!(CacheKey::parse("release..notes.json").is_ok());
    }

    #[test]
    fn derived_key_depends_on_predicate() {
        let a = CacheKey::derived("https://example.com/a", &ResponseTest::None);
        let b = CacheKey::derived(
            "https://example.com/a",
            &ResponseTest::Contains("ok".into()),
        );
        assert_ne!(a, b);
        assert!(a.as_str().ends_with(".cache"));
        assert!(CacheKey::parse(a.as_str()).is_ok());
    }
}
