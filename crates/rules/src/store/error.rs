//! Error types for the routing rule store.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors that can occur while reading or rewriting a rules file.
///
/// Every file-related variant carries the configured path.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The file could not be opened, read, written, or locked.
    #[error("failed to read or update routing rules at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file content is not a valid stream of routing rule documents.
    #[error("failed to parse routing rules at {} (document {document}): {source}", .path.display())]
    Parse {
        path: PathBuf,
        /// Zero-based position of the offending document.
        document: usize,
        #[source]
        source: serde_yaml::Error,
    },

    /// The updated rule set could not be serialized into a readable stream.
    #[error("failed to serialize routing rules for {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A bounded lock wait expired before the lock was acquired.
    #[error("lock on routing rules at {} not acquired within {timeout:?}", .path.display())]
    LockTimeout {
        path: PathBuf,
        /// The configured bound on the wait.
        timeout: Duration,
    },

    /// The caller passed an invalid rule.
    #[error("Validation error: {0}")]
    Validation(String),
}

impl StoreError {
    /// The rules file this error refers to, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            StoreError::Io { path, .. }
            | StoreError::Parse { path, .. }
            | StoreError::Encode { path, .. }
            | StoreError::LockTimeout { path, .. } => Some(path),
            StoreError::Validation(_) => None,
        }
    }

    /// Whether this is an I/O class failure (including lock timeouts).
    pub fn is_io(&self) -> bool {
        matches!(self, StoreError::Io { .. } | StoreError::LockTimeout { .. })
    }

    /// Whether the existing file content failed to parse.
    pub fn is_parse(&self) -> bool {
        matches!(self, StoreError::Parse { .. })
    }
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
