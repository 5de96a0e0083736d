//! Test fixtures and manager helpers.
//!
//! Provides managers over each store implementation with fast retry
//! settings, plus common record scenarios.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use syncstate_core::{
    OpContext, RecordScope, ResourceType, RetryConfig, SourceIdentity, StateRecord,
    SyncStateConfig, SyncStateManager,
};
use syncstate_storage::{FaultyStore, FileStore, InMemoryStore, RecordStore};
use tempfile::TempDir;

/// Configuration with millisecond retry delays, for tests that provoke
/// conflicts.
pub fn fast_config() -> SyncStateConfig {
    SyncStateConfig::new()
        .with_retry(
            RetryConfig::new(5)
                .with_initial_delay(Duration::from_millis(1))
                .with_jitter(0.0),
        )
        .with_default_timeout(Duration::from_secs(10))
}

/// A context with no deadline.
pub fn ctx() -> OpContext {
    OpContext::background()
}

/// A file-backed manager that owns its temporary directory.
pub struct TestFileManager {
    /// The manager instance.
    pub manager: SyncStateManager<FileStore>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: TempDir,
}

impl TestFileManager {
    /// Creates a manager over a fresh temporary directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(temp_dir.path()).expect("Failed to open file store");
        Self {
            manager: SyncStateManager::with_config(Arc::new(store), fast_config()),
            temp_dir,
        }
    }

    /// Directory holding the store.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Opens a second manager over the same directory, as another process
    /// would.
    pub fn reopen(&self) -> SyncStateManager<FileStore> {
        let store = FileStore::open(self.temp_dir.path()).expect("Failed to reopen file store");
        SyncStateManager::with_config(Arc::new(store), fast_config())
    }
}

impl Default for TestFileManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestFileManager {
    type Target = SyncStateManager<FileStore>;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

/// Creates a manager over a fresh in-memory store.
pub fn memory_manager() -> SyncStateManager<InMemoryStore> {
    SyncStateManager::with_config(Arc::new(InMemoryStore::new()), fast_config())
}

/// Creates a manager over a fault-injecting in-memory store.
pub fn faulty_manager() -> SyncStateManager<FaultyStore<InMemoryStore>> {
    SyncStateManager::with_config(
        Arc::new(FaultyStore::new(InMemoryStore::new())),
        fast_config(),
    )
}

/// Runs a test with a manager over a fresh in-memory store.
pub fn with_memory_manager<F, R>(f: F) -> R
where
    F: FnOnce(&SyncStateManager<InMemoryStore>) -> R,
{
    f(&memory_manager())
}

/// Runs a test with a manager over a temporary directory.
pub fn with_file_manager<F, R>(f: F) -> R
where
    F: FnOnce(&SyncStateManager<FileStore>, &Path) -> R,
{
    let fixture = TestFileManager::new();
    f(&fixture.manager, fixture.path())
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use serde_json::json;

    /// Source identity `Producer/default/<name>`.
    pub fn producer(name: &str) -> SourceIdentity {
        SourceIdentity::namespaced("Producer", "default", name)
    }

    /// Creates `(resource_type, key)` and adds one entry per producer name,
    /// each with config `{"producer": <name>}` and default priority.
    pub fn record_with_sources<S: RecordStore>(
        manager: &SyncStateManager<S>,
        resource_type: ResourceType,
        key: &str,
        producers: &[&str],
    ) -> StateRecord {
        let mut record = manager
            .get_or_create(&ctx(), resource_type, key, &RecordScope::new())
            .expect("Failed to create record");
        for name in producers {
            record = manager
                .update_source(&ctx(), &record, &producer(name), &json!({ "producer": name }), 100)
                .expect("Failed to add source");
        }
        record
    }

    /// Re-reads a record, panicking if it is missing.
    pub fn reload<S: RecordStore>(
        manager: &SyncStateManager<S>,
        resource_type: ResourceType,
        key: &str,
    ) -> StateRecord {
        manager
            .get(&ctx(), resource_type, key)
            .expect("Failed to read record")
            .expect("Record should exist")
    }
}
