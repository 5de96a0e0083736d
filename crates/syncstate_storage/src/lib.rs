//! # SyncState Storage
//!
//! Versioned record store trait and implementations for SyncState.
//!
//! This crate provides the lowest-level storage abstraction for SyncState.
//! Stores hold **opaque versioned objects** - they do not interpret the
//! payload they store. The coordination layer in `syncstate_core` owns the
//! record format.
//!
//! ## Design Principles
//!
//! - Every object carries a monotonic version token
//! - Updates and conditional deletes must present the version they last
//!   observed; a stale version is rejected with [`StorageError::VersionConflict`]
//! - Creating an object that already exists fails with
//!   [`StorageError::AlreadyExists`]
//! - Objects carry string labels that can be used for indexed listing
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and single-process deployments
//! - [`FileStore`] - Directory-backed store shared across processes
//! - [`FaultyStore`] - Wrapper that injects conflicts and failures
//!
//! ## Example
//!
//! ```rust
//! use syncstate_storage::{InMemoryStore, Labels, RecordStore};
//!
//! let store = InMemoryStore::new();
//! let created = store.create("tunnel-abc", &Labels::new(), b"v1").unwrap();
//! assert_eq!(created.version, 1);
//!
//! let updated = store.update("tunnel-abc", created.version, b"v2").unwrap();
//! assert_eq!(updated.version, 2);
//!
//! // A write carrying the old version is rejected
//! assert!(store.update("tunnel-abc", created.version, b"v3").is_err());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod faulty;
mod file;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use faulty::FaultyStore;
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use store::{matches_selector, validate_name, Labels, RecordStore, StoredObject, MAX_NAME_LEN};
