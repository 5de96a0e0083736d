//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The object does not exist.
    #[error("object not found: {name}")]
    NotFound {
        /// Name of the missing object.
        name: String,
    },

    /// An object with this name already exists.
    #[error("object already exists: {name}")]
    AlreadyExists {
        /// Name of the existing object.
        name: String,
    },

    /// The caller's version token is stale.
    #[error("version conflict on {name}: expected {expected}, stored {actual}")]
    VersionConflict {
        /// Name of the object.
        name: String,
        /// Version presented by the caller.
        expected: u64,
        /// Version currently stored.
        actual: u64,
    },

    /// The object name is not a valid store identifier.
    #[error("invalid object name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A stored object could not be decoded.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The store cannot be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Returns true if this is a stale-version rejection.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::VersionConflict { .. })
    }

    /// Returns true if the object was missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    /// Returns true if a create lost a race against another creator.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StorageError::AlreadyExists { .. })
    }
}
