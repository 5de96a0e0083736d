//! Fault-injecting store wrapper.
//!
//! Wraps any [`RecordStore`] and lets tests script the failures a shared
//! backing store produces under contention: stale-version rejections,
//! a competing writer landing between read and write, failing deletes, and
//! outright unavailability.

use crate::error::{StorageError, StorageResult};
use crate::store::{Labels, RecordStore, StoredObject};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

type UpdateHook<S> = Box<dyn FnOnce(&S) + Send>;

/// A store wrapper that injects faults.
///
/// Faults are consumed in the order they are checked: unavailability first,
/// then the one-shot pre-update hook, then counted conflicts.
///
/// # Example
///
/// ```rust
/// use syncstate_storage::{FaultyStore, InMemoryStore, Labels, RecordStore};
///
/// let store = FaultyStore::new(InMemoryStore::new());
/// store.create("a", &Labels::new(), b"v1").unwrap();
///
/// store.inject_update_conflicts(1);
/// assert!(store.update("a", 1, b"v2").is_err());
/// assert!(store.update("a", 1, b"v2").is_ok());
/// ```
pub struct FaultyStore<S: RecordStore> {
    inner: S,
    unavailable: AtomicBool,
    update_conflicts: AtomicU32,
    delete_conflicts: AtomicU32,
    failing_deletes: Mutex<HashSet<String>>,
    before_update: Mutex<Option<UpdateHook<S>>>,
    update_calls: AtomicU64,
    delete_calls: AtomicU64,
}

impl<S: RecordStore> FaultyStore<S> {
    /// Wraps `inner` with no faults armed.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            unavailable: AtomicBool::new(false),
            update_conflicts: AtomicU32::new(0),
            delete_conflicts: AtomicU32::new(0),
            failing_deletes: Mutex::new(HashSet::new()),
            before_update: Mutex::new(None),
            update_calls: AtomicU64::new(0),
            delete_calls: AtomicU64::new(0),
        }
    }

    /// Returns the wrapped store, bypassing all faults.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Makes every call fail with `Unavailable` until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Rejects the next `count` updates with a version conflict.
    pub fn inject_update_conflicts(&self, count: u32) {
        self.update_conflicts.store(count, Ordering::SeqCst);
    }

    /// Rejects the next `count` conditional deletes with a version conflict.
    pub fn inject_delete_conflicts(&self, count: u32) {
        self.delete_conflicts.store(count, Ordering::SeqCst);
    }

    /// Makes every delete of `name` fail with `Unavailable`.
    pub fn fail_deletes_of(&self, name: impl Into<String>) {
        self.failing_deletes.lock().insert(name.into());
    }

    /// Runs `hook` against the inner store right before the next update.
    ///
    /// This simulates a competing writer that lands between the caller's
    /// read and its write.
    pub fn before_next_update(&self, hook: impl FnOnce(&S) + Send + 'static) {
        *self.before_update.lock() = Some(Box::new(hook));
    }

    /// Number of update calls seen, including rejected ones.
    pub fn update_calls(&self) -> u64 {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Number of delete calls seen, including rejected ones.
    pub fn delete_calls(&self) -> u64 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("injected outage".into()))
        } else {
            Ok(())
        }
    }

    fn take_one(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn injected_conflict(&self, name: &str, expected: u64) -> StorageError {
        let actual = self
            .inner
            .get(name)
            .ok()
            .flatten()
            .map_or(expected, |object| object.version);
        StorageError::VersionConflict {
            name: name.to_string(),
            expected,
            actual,
        }
    }
}

impl<S: RecordStore> RecordStore for FaultyStore<S> {
    fn get(&self, name: &str) -> StorageResult<Option<StoredObject>> {
        self.check_available()?;
        self.inner.get(name)
    }

    fn create(&self, name: &str, labels: &Labels, data: &[u8]) -> StorageResult<StoredObject> {
        self.check_available()?;
        self.inner.create(name, labels, data)
    }

    fn update(
        &self,
        name: &str,
        expected_version: u64,
        data: &[u8],
    ) -> StorageResult<StoredObject> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let hook = self.before_update.lock().take();
        if let Some(hook) = hook {
            hook(&self.inner);
        }

        if Self::take_one(&self.update_conflicts) {
            return Err(self.injected_conflict(name, expected_version));
        }
        self.inner.update(name, expected_version, data)
    }

    fn delete(&self, name: &str, expected_version: Option<u64>) -> StorageResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        if self.failing_deletes.lock().contains(name) {
            return Err(StorageError::Unavailable(format!(
                "injected delete failure for {name}"
            )));
        }
        if let Some(expected) = expected_version {
            if Self::take_one(&self.delete_conflicts) {
                return Err(self.injected_conflict(name, expected));
            }
        }
        self.inner.delete(name, expected_version)
    }

    fn names(&self) -> StorageResult<Vec<String>> {
        self.check_available()?;
        self.inner.names()
    }

    fn list(&self, selector: &Labels) -> StorageResult<Vec<StoredObject>> {
        self.check_available()?;
        self.inner.list(selector)
    }
}
