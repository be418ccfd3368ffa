use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::StoreError;

/// Write `contents` to `path` so readers only ever see the old file or the
/// complete new one.
///
/// The data goes to a temp file in the destination directory, is synced, and
/// is then renamed over `path`. Missing parent directories are created.
///
/// # Errors
///
/// Returns [`StoreError::Io`] if any step fails; `path` is left untouched.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| StoreError::io("create directory", dir, e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".cachewarm-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| StoreError::io("create temp file in", dir, e))?;
    tmp.write_all(contents)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| StoreError::io("write temp file for", path, e))?;
    tmp.persist(path)
        .map_err(|e| StoreError::io("rename temp file onto", path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_parents_and_replaces_contents() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a/b/c.json");

        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"two");
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
    }

    #[test]
    fn failed_rename_leaves_target_and_no_temp_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let sibling = dir.path().join("entry");
        write_atomic(&sibling, b"good").unwrap();

        // A non-empty directory cannot be replaced by a file rename.
        let blocked = dir.path().join("blocked");
        fs::create_dir_all(blocked.join("child")).unwrap();
        assert!(write_atomic(&blocked, b"bad").is_err());

        assert!(blocked.join("child").is_dir());
        assert_eq!(fs::read(&sibling).unwrap(), b"good");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
    }
}
