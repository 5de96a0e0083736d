//! Error types for SyncState core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in SyncState core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Backing store error, with the operation and record it happened on.
    #[error("{operation} {record}: {source}")]
    Store {
        /// Operation being performed.
        operation: &'static str,
        /// Record name.
        record: String,
        /// Underlying store error.
        #[source]
        source: syncstate_storage::StorageError,
    },

    /// Backing store error outside of a single-record operation.
    #[error("storage error: {0}")]
    Storage(#[from] syncstate_storage::StorageError),

    /// A stored record could not be encoded or decoded.
    #[error("codec error for {record}: {message}")]
    Codec {
        /// Record name.
        record: String,
        /// Description of the failure.
        message: String,
    },

    /// A producer's configuration could not be serialized.
    #[error("failed to serialize config from {source_id}: {error}")]
    ConfigSerialization {
        /// Canonical source identity string.
        source_id: String,
        /// Underlying JSON error.
        #[source]
        error: serde_json::Error,
    },

    /// Conflicting writers kept winning until the retry budget ran out.
    #[error("gave up updating {record} after {attempts} conflicting attempts")]
    RetryExhausted {
        /// Record name.
        record: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The record disappeared while it was being updated.
    #[error("record {record} was deleted concurrently")]
    RecordVanished {
        /// Record name.
        record: String,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// A source identity string did not have the `Kind/[Namespace/]Name` form.
    #[error("invalid source identity: {0:?}")]
    InvalidSourceIdentity(String),

    /// An unknown resource type tag.
    #[error("unknown resource type: {0:?}")]
    UnknownResourceType(String),

    /// A configuration value could not be parsed.
    #[error("invalid configuration {key}: {message}")]
    InvalidConfig {
        /// The offending setting.
        key: String,
        /// Why it was rejected.
        message: String,
    },
}

impl CoreError {
    /// Wraps a store error with the operation and record it came from.
    pub fn store(
        operation: &'static str,
        record: impl Into<String>,
        source: syncstate_storage::StorageError,
    ) -> Self {
        Self::Store {
            operation,
            record: record.into(),
            source,
        }
    }

    /// Returns true if the caller may simply requeue the operation.
    ///
    /// Retry exhaustion, codec faults and malformed input need an operator.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Store { source, .. } | CoreError::Storage(source) => !matches!(
                source,
                syncstate_storage::StorageError::Corrupted(_)
                    | syncstate_storage::StorageError::InvalidName { .. }
            ),
            CoreError::RecordVanished { .. }
            | CoreError::Cancelled
            | CoreError::DeadlineExceeded => true,
            _ => false,
        }
    }

    /// Returns true if this error needs operator attention.
    pub fn needs_attention(&self) -> bool {
        !self.is_retryable()
    }
}
