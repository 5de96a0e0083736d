//! Record store trait definition.

use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum length of an object name.
pub const MAX_NAME_LEN: usize = 253;

/// Labels attached to an object, used for indexed listing.
pub type Labels = BTreeMap<String, String>;

/// A versioned object as held by a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Unique object name.
    pub name: String,
    /// Optimistic-concurrency token. Strictly increases on every successful
    /// write and is never handed out twice by a store, not even to an
    /// object created again under a deleted name.
    pub version: u64,
    /// Index labels, fixed at creation.
    pub labels: Labels,
    /// Opaque payload.
    pub data: Vec<u8>,
}

/// A keyed object store with optimistic concurrency.
///
/// Stores are **opaque**: they never look inside `data`. The coordination
/// layer decides what a payload means.
///
/// # Invariants
///
/// - `create` fails with `AlreadyExists` if the name is taken
/// - `update` succeeds only if `expected_version` equals the stored version,
///   and returns the object with its new version
/// - `delete` with `Some(version)` succeeds only if that version is current
/// - Stores must be `Send + Sync`; every call is one linearization point
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistence across processes
/// - [`super::FaultyStore`] - Fault-injection wrapper
pub trait RecordStore: Send + Sync {
    /// Fetches an object by name. A missing object is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, name: &str) -> StorageResult<Option<StoredObject>>;

    /// Creates a new object at version 1.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the name is taken, `InvalidName` if the
    /// name is not a valid identifier.
    fn create(&self, name: &str, labels: &Labels, data: &[u8]) -> StorageResult<StoredObject>;

    /// Replaces the payload of an existing object.
    ///
    /// # Errors
    ///
    /// Returns `VersionConflict` if `expected_version` is stale and
    /// `NotFound` if the object does not exist.
    fn update(&self, name: &str, expected_version: u64, data: &[u8])
        -> StorageResult<StoredObject>;

    /// Deletes an object, optionally conditional on its version.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the object does not exist and
    /// `VersionConflict` if the precondition fails.
    fn delete(&self, name: &str, expected_version: Option<u64>) -> StorageResult<()>;

    /// Returns the names of all stored objects, sorted, without decoding
    /// them.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn names(&self) -> StorageResult<Vec<String>>;

    /// Lists objects whose labels contain every pair in `selector`.
    ///
    /// Results are ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list(&self, selector: &Labels) -> StorageResult<Vec<StoredObject>>;
}

/// Checks that `name` is usable as an object name.
///
/// Valid names are non-empty, at most [`MAX_NAME_LEN`] bytes, and consist of
/// lowercase ASCII letters, digits, `-` and `.`.
pub fn validate_name(name: &str) -> StorageResult<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.len() > MAX_NAME_LEN {
        Some("name is too long")
    } else if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
    {
        Some("name contains characters outside [a-z0-9.-]")
    } else if name.starts_with('.') {
        Some("name starts with a dot")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StorageError::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Returns true if `labels` contains every pair in `selector`.
pub fn matches_selector(labels: &Labels, selector: &Labels) -> bool {
    selector
        .iter()
        .all(|(k, v)| labels.get(k).is_some_and(|have| have == v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(validate_name("access-application-pending-my-app").is_ok());
        assert!(validate_name("a").is_ok());
        assert!(validate_name("zone.v1-x").is_ok());
    }

    #[test]
    fn invalid_names() {
        assert!(validate_name("").is_err());
        assert!(validate_name("Upper").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name(&"a".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn selector_matching() {
        let mut labels = Labels::new();
        labels.insert("type".into(), "tunnel".into());
        labels.insert("key".into(), "abc".into());

        assert!(matches_selector(&labels, &Labels::new()));

        let mut selector = Labels::new();
        selector.insert("type".into(), "tunnel".into());
        assert!(matches_selector(&labels, &selector));

        selector.insert("key".into(), "other".into());
        assert!(!matches_selector(&labels, &selector));
    }

    mod prop {
        use super::*;
        use crate::InMemoryStore;
        use proptest::prelude::*;
        use proptest::prelude::prop;

        proptest! {
            #[test]
            fn generated_names_validate(name in "[a-z0-9][a-z0-9.-]{0,62}") {
                prop_assert!(validate_name(&name).is_ok());
            }

            #[test]
            fn only_current_version_wins(stale in prop::collection::vec(any::<bool>(), 1..20)) {
                let store = InMemoryStore::new();
                let mut current = store.create("obj", &Labels::new(), b"0").unwrap().version;

                for (i, use_stale) in stale.into_iter().enumerate() {
                    let presented = if use_stale { current - 1 } else { current };
                    let data = i.to_string();
                    match store.update("obj", presented, data.as_bytes()) {
                        Ok(object) => {
                            prop_assert!(!use_stale);
                            prop_assert!(object.version > current);
                            current = object.version;
                        }
                        Err(e) => {
                            prop_assert!(use_stale);
                            prop_assert!(e.is_conflict());
                        }
                    }
                }

                prop_assert_eq!(store.get("obj").unwrap().unwrap().version, current);
            }
        }
    }
}
