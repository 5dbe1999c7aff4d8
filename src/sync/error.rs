//! Error types for the sync engine.

use std::path::PathBuf;

use thiserror::Error;

use super::engine::MAX_CONCURRENCY;

/// Local filesystem failures while materializing the mirror tree.
///
/// A directory failure aborts only the subtree below it.
#[derive(Debug, Error)]
pub enum FilesystemError {
    #[error("cannot create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write metadata {}: {source}", .path.display())]
    WriteMetadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode metadata for {}: {source}", .path.display())]
    EncodeMetadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl FilesystemError {
    /// Path the failure refers to.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::CreateDir { path, .. }
            | Self::WriteMetadata { path, .. }
            | Self::EncodeMetadata { path, .. } => path,
        }
    }
}

/// Error constructing a [`SyncEngine`](super::SyncEngine).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error("invalid concurrency value {value}: must be between 1 and {max}", max = MAX_CONCURRENCY)]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_dir_display_and_path() {
        let error = FilesystemError::CreateDir {
            path: PathBuf::from("/mirror/course"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(error.to_string().contains("/mirror/course"));
        assert_eq!(error.path(), std::path::Path::new("/mirror/course"));
    }

    #[test]
    fn test_invalid_concurrency_display() {
        let error = EngineError::InvalidConcurrency { value: 0 };
        assert!(error.to_string().contains("between 1 and 16"));
    }
}
