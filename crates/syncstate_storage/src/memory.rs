//! In-memory record store.

use crate::error::{StorageError, StorageResult};
use crate::store::{matches_selector, validate_name, Labels, RecordStore, StoredObject};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// An in-memory record store.
///
/// This store keeps all objects in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Single-process deployments that rebuild state on restart
///
/// # Thread Safety
///
/// Every operation takes the internal lock once, so each call is a single
/// linearization point. The store can be shared across threads behind an
/// `Arc`.
///
/// Versions come from one store-wide counter, so an object that is deleted
/// and created again never reuses a version of its earlier incarnation.
///
/// # Example
///
/// ```rust
/// use syncstate_storage::{InMemoryStore, Labels, RecordStore};
///
/// let store = InMemoryStore::new();
/// store.create("dns-record-abc", &Labels::new(), b"payload").unwrap();
/// assert_eq!(store.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    last_version: AtomicU64,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns true if the store holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Removes every object.
    pub fn clear(&self) {
        self.objects.write().clear();
    }

    // Callers hold the write lock.
    fn next_version(&self) -> u64 {
        self.last_version.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl RecordStore for InMemoryStore {
    fn get(&self, name: &str) -> StorageResult<Option<StoredObject>> {
        Ok(self.objects.read().get(name).cloned())
    }

    fn create(&self, name: &str, labels: &Labels, data: &[u8]) -> StorageResult<StoredObject> {
        validate_name(name)?;

        let mut objects = self.objects.write();
        if objects.contains_key(name) {
            return Err(StorageError::AlreadyExists {
                name: name.to_string(),
            });
        }

        let object = StoredObject {
            name: name.to_string(),
            version: self.next_version(),
            labels: labels.clone(),
            data: data.to_vec(),
        };
        objects.insert(name.to_string(), object.clone());
        Ok(object)
    }

    fn update(
        &self,
        name: &str,
        expected_version: u64,
        data: &[u8],
    ) -> StorageResult<StoredObject> {
        let mut objects = self.objects.write();
        let object = objects.get_mut(name).ok_or_else(|| StorageError::NotFound {
            name: name.to_string(),
        })?;

        if object.version != expected_version {
            return Err(StorageError::VersionConflict {
                name: name.to_string(),
                expected: expected_version,
                actual: object.version,
            });
        }

        object.version = self.next_version();
        object.data = data.to_vec();
        Ok(object.clone())
    }

    fn delete(&self, name: &str, expected_version: Option<u64>) -> StorageResult<()> {
        let mut objects = self.objects.write();
        let object = objects.get(name).ok_or_else(|| StorageError::NotFound {
            name: name.to_string(),
        })?;

        if let Some(expected) = expected_version {
            if object.version != expected {
                return Err(StorageError::VersionConflict {
                    name: name.to_string(),
                    expected,
                    actual: object.version,
                });
            }
        }

        objects.remove(name);
        Ok(())
    }

    fn names(&self) -> StorageResult<Vec<String>> {
        Ok(self.objects.read().keys().cloned().collect())
    }

    fn list(&self, selector: &Labels) -> StorageResult<Vec<StoredObject>> {
        Ok(self
            .objects
            .read()
            .values()
            .filter(|object| matches_selector(&object.labels, selector))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn create_starts_at_version_one() {
        let store = InMemoryStore::new();
        let object = store.create("a", &Labels::new(), b"hello").unwrap();
        assert_eq!(object.version, 1);
        assert_eq!(store.get("a").unwrap().unwrap().data, b"hello");
    }

    #[test]
    fn create_twice_fails() {
        let store = InMemoryStore::new();
        store.create("a", &Labels::new(), b"one").unwrap();
        let result = store.create("a", &Labels::new(), b"two");
        assert!(matches!(result, Err(StorageError::AlreadyExists { .. })));
        assert_eq!(store.get("a").unwrap().unwrap().data, b"one");
    }

    #[test]
    fn create_rejects_invalid_name() {
        let store = InMemoryStore::new();
        let result = store.create("Not/Valid", &Labels::new(), b"");
        assert!(matches!(result, Err(StorageError::InvalidName { .. })));
    }

    #[test]
    fn update_bumps_version() {
        let store = InMemoryStore::new();
        store.create("a", &Labels::new(), b"v1").unwrap();
        let updated = store.update("a", 1, b"v2").unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.data, b"v2");
    }

    #[test]
    fn stale_update_is_rejected() {
        let store = InMemoryStore::new();
        store.create("a", &Labels::new(), b"v1").unwrap();
        store.update("a", 1, b"v2").unwrap();

        let result = store.update("a", 1, b"stale");
        assert!(matches!(
            result,
            Err(StorageError::VersionConflict {
                expected: 1,
                actual: 2,
                ..
            })
        ));
        assert_eq!(store.get("a").unwrap().unwrap().data, b"v2");
    }

    #[test]
    fn update_missing_is_not_found() {
        let store = InMemoryStore::new();
        let result = store.update("a", 1, b"v");
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[test]
    fn conditional_delete() {
        let store = InMemoryStore::new();
        store.create("a", &Labels::new(), b"v1").unwrap();
        store.update("a", 1, b"v2").unwrap();

        let result = store.delete("a", Some(1));
        assert!(matches!(result, Err(StorageError::VersionConflict { .. })));
        assert!(store.get("a").unwrap().is_some());

        store.delete("a", Some(2)).unwrap();
        assert!(store.get("a").unwrap().is_none());
    }

    #[test]
    fn delete_missing_is_not_found() {
        let store = InMemoryStore::new();
        let result = store.delete("a", None);
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[test]
    fn list_by_selector() {
        let store = InMemoryStore::new();
        store
            .create("b", &labels(&[("type", "tunnel")]), b"")
            .unwrap();
        store
            .create("a", &labels(&[("type", "tunnel")]), b"")
            .unwrap();
        store
            .create("c", &labels(&[("type", "dns-record")]), b"")
            .unwrap();

        let tunnels = store.list(&labels(&[("type", "tunnel")])).unwrap();
        let names: Vec<_> = tunnels.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        assert_eq!(store.list(&Labels::new()).unwrap().len(), 3);
    }

    #[test]
    fn recreated_object_never_reuses_a_version() {
        let store = InMemoryStore::new();
        let first = store.create("a", &Labels::new(), b"old").unwrap();
        store.delete("a", Some(first.version)).unwrap();

        let second = store.create("a", &Labels::new(), b"new").unwrap();
        assert!(second.version > first.version);

        let result = store.update("a", first.version, b"stale");
        assert!(matches!(result, Err(StorageError::VersionConflict { .. })));
        assert_eq!(store.get("a").unwrap().unwrap().data, b"new");
    }

    #[test]
    fn names_are_sorted() {
        let store = InMemoryStore::new();
        store.create("b", &Labels::new(), b"").unwrap();
        store.create("a", &Labels::new(), b"").unwrap();
        assert_eq!(store.names().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn concurrent_updates_serialize() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryStore::new());
        store.create("counter", &Labels::new(), b"").unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let mut wins = 0;
                    for _ in 0..50 {
                        loop {
                            let current = store.get("counter").unwrap().unwrap();
                            if store.update("counter", current.version, b"x").is_ok() {
                                wins += 1;
                                break;
                            }
                        }
                    }
                    wins
                })
            })
            .collect();

        let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 200);
        assert_eq!(store.get("counter").unwrap().unwrap().version, 201);
    }
}
