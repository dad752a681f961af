//! Error types for the deversion library
//!
//! This module defines every error that can occur while restoring a versioned
//! backup tree. Most of them are per-node errors: the restore engine catches
//! them at the node boundary and turns them into report counters and failure
//! list entries, so a single bad version folder never stops the whole run.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the deversion library
pub type Result<T> = std::result::Result<T, DeversionError>;

/// Main error type for all deversion operations
#[derive(Debug, Error)]
pub enum DeversionError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Path exceeds the platform path-length limit
    #[error("Path too long ({len} > {limit} chars): {path:?}")]
    PathTooLong {
        /// Offending path
        path: PathBuf,
        /// Length of the path in characters
        len: usize,
        /// Configured limit
        limit: usize,
    },

    /// A plain file was found where only directories are allowed
    #[error("Unexpected plain file in backup directory: {0:?}")]
    StructuralViolation(PathBuf),

    /// An entry disappeared between listing and access
    #[error("Could not access entry (missing or unreadable): {0:?}")]
    MissingEntry(PathBuf),

    /// Copying a file version to the restore tree failed
    #[error("Copy failed: {src:?} -> {dst:?}: {source}")]
    CopyFailed {
        /// Version file being restored
        src: PathBuf,
        /// Destination in the restore tree
        dst: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Version folder contents do not follow the backup layout
    #[error("Data integrity error in {path:?}: {reason}")]
    DataIntegrity {
        /// Version folder or version entry at fault
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// The run was cancelled by the user
    #[error("Interrupted by user")]
    Interrupted,

    /// Timestamp string could not be parsed
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Copy submitted to a pool that has already been closed
    #[error("Copy worker pool is closed and cannot accept more jobs")]
    PoolClosed,

    /// Waiting on a pool that was never closed
    #[error("Copy worker pool must be closed before waiting for workers")]
    PoolNotClosed,

    /// Worker thread could not be spawned or panicked
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

impl DeversionError {
    /// Create a data integrity error for `path`
    pub fn integrity(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        DeversionError::DataIntegrity {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Map an I/O error on `path` to `MissingEntry` when the entry is gone
    pub fn from_access(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => DeversionError::MissingEntry(path.into()),
            _ => DeversionError::Io(err),
        }
    }

    /// Check if this error only affects a single node of the walk
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DeversionError::PathTooLong { .. }
                | DeversionError::StructuralViolation(_)
                | DeversionError::MissingEntry(_)
                | DeversionError::CopyFailed { .. }
                | DeversionError::DataIntegrity { .. }
                | DeversionError::Io(_)
        )
    }

    /// Check if this error is a user cancellation
    pub fn is_interrupt(&self) -> bool {
        matches!(self, DeversionError::Interrupted)
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            DeversionError::PathTooLong { path, limit, .. } => {
                format!(
                    "Path {:?} is longer than {} characters and was skipped. \
                     Move the backup closer to the filesystem root to shorten it.",
                    path, limit
                )
            }
            DeversionError::InvalidTimestamp(s) => {
                format!(
                    "Could not parse '{}' as a date. Use YYYYMMDDHHMMSS, YYYY-MM-DD or YYYY-MM-DD HH:MM:SS.",
                    s
                )
            }
            DeversionError::MissingEntry(path) => {
                format!("{:?} vanished or could not be read. Maybe the path is too long?", path)
            }
            _ => self.to_string(),
        }
    }
}
