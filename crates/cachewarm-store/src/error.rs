use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("StoreError: failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("StoreError: corrupt record {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

impl StoreError {
    pub(crate) fn io(action: &'static str, path: &std::path::Path, source: std::io::Error) -> Self {
        StoreError::Io {
            action,
            path: path.display().to_string(),
            source,
        }
    }
}
