//! The state record model.
//!
//! One [`StateRecord`] exists per external resource (or per placeholder for
//! a resource not yet created). It holds every producer's contribution as a
//! [`ContributionEntry`], unique by [`SourceIdentity`].

use crate::naming::{
    hyphen_case, label_value, record_name, LABEL_RESOURCE_KEY, LABEL_RESOURCE_TYPE,
};
use crate::types::{Priority, ResourceType, SourceIdentity, SyncStatus};
use serde::de::{DeserializeOwned, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use syncstate_storage::Labels;

/// Returns the current time in Unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// A producer's configuration fragment, kept as opaque JSON bytes.
///
/// This layer never looks inside the payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigPayload(Vec<u8>);

impl ConfigPayload {
    /// Serializes `value` to JSON.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if `value` cannot be serialized.
    pub fn from_json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_vec(value).map(Self)
    }

    /// Wraps already-serialized bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Deserializes the payload.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the bytes do not describe a `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.0)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for ConfigPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for ConfigPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PayloadVisitor;

        impl<'de> Visitor<'de> for PayloadVisitor {
            type Value = ConfigPayload;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte string")
            }

            fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                Ok(ConfigPayload(v.to_vec()))
            }

            fn visit_byte_buf<E: serde::de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
                Ok(ConfigPayload(v))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(b) = seq.next_element::<u8>()? {
                    bytes.push(b);
                }
                Ok(ConfigPayload(bytes))
            }
        }

        deserializer.deserialize_byte_buf(PayloadVisitor)
    }
}

/// One producer's contribution to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionEntry {
    /// Who contributed.
    pub source: SourceIdentity,
    /// The contributed configuration fragment.
    pub config: ConfigPayload,
    /// Precedence hint; lower wins downstream.
    pub priority: Priority,
    /// Last write by this source, Unix milliseconds.
    pub last_updated: u64,
}

impl ContributionEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(source: SourceIdentity, config: ConfigPayload, priority: Priority) -> Self {
        Self {
            source,
            config,
            priority,
            last_updated: now_millis(),
        }
    }
}

/// Scoping fields fixed when a record is first created.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordScope {
    /// Account identifier, opaque to this layer.
    pub account_scope: Option<String>,
    /// Zone identifier, opaque to this layer.
    pub zone_scope: Option<String>,
    /// Reference to the credential set used for the record.
    pub credentials_ref: Option<String>,
}

impl RecordScope {
    /// Creates an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the account scope.
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account_scope = Some(account.into());
        self
    }

    /// Sets the zone scope.
    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone_scope = Some(zone.into());
        self
    }

    /// Sets the credentials reference.
    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials_ref = Some(credentials.into());
        self
    }
}

/// The coordination record merging all producers' contributions for one
/// external resource.
///
/// `name` and `version` come from the store and are not part of the encoded
/// payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    #[serde(skip)]
    pub(crate) name: String,
    #[serde(skip)]
    pub(crate) version: u64,
    /// Kind of external resource.
    pub resource_type: ResourceType,
    /// External ID, or `pending-<producer>`.
    pub key: String,
    /// Scope fixed at creation.
    pub scope: RecordScope,
    /// Contributions in insertion order.
    pub sources: Vec<ContributionEntry>,
    /// Written by the downstream sync worker.
    pub sync_status: SyncStatus,
    /// Written by the downstream sync worker.
    pub result_data: BTreeMap<String, String>,
}

impl StateRecord {
    /// Creates an unsaved record with no sources.
    pub fn new(resource_type: ResourceType, key: impl Into<String>, scope: RecordScope) -> Self {
        let key = key.into();
        Self {
            name: record_name(resource_type, &key),
            version: 0,
            resource_type,
            key,
            scope,
            sources: Vec::new(),
            sync_status: SyncStatus::Pending,
            result_data: BTreeMap::new(),
        }
    }

    /// Store name of the record.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version token observed when the record was read. Zero if unsaved.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Index labels for the record.
    pub fn labels(&self) -> Labels {
        let mut labels = Labels::new();
        labels.insert(
            LABEL_RESOURCE_TYPE.to_string(),
            hyphen_case(self.resource_type.as_str()),
        );
        labels.insert(LABEL_RESOURCE_KEY.to_string(), label_value(&self.key));
        labels
    }

    /// Returns true if no producer contributes to this record.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Finds the entry contributed by `source`.
    pub fn find_source(&self, source: &SourceIdentity) -> Option<&ContributionEntry> {
        self.sources.iter().find(|e| &e.source == source)
    }

    /// Inserts or replaces the entry for `entry.source`.
    ///
    /// A replaced entry keeps its position.
    pub fn upsert_source(&mut self, entry: ContributionEntry) {
        match self.sources.iter_mut().find(|e| e.source == entry.source) {
            Some(existing) => *existing = entry,
            None => self.sources.push(entry),
        }
    }

    /// Removes the entry for `source`. Returns true if one was present.
    pub fn remove_source(&mut self, source: &SourceIdentity) -> bool {
        let before = self.sources.len();
        self.sources.retain(|e| &e.source != source);
        self.sources.len() != before
    }

    /// Merges `entries` into this record.
    ///
    /// An identity present on both sides keeps whichever entry was written
    /// last; ties go to the incoming entry. Returns true if anything changed.
    pub fn merge_sources(&mut self, entries: &[ContributionEntry]) -> bool {
        let mut changed = false;
        for entry in entries {
            let newer = self
                .find_source(&entry.source)
                .is_none_or(|existing| {
                    existing != entry && entry.last_updated >= existing.last_updated
                });
            if newer {
                self.upsert_source(entry.clone());
                changed = true;
            }
        }
        changed
    }

    /// Sources ordered by ascending priority, insertion order within ties.
    pub fn sources_by_priority(&self) -> Vec<&ContributionEntry> {
        let mut ordered: Vec<_> = self.sources.iter().collect();
        ordered.sort_by_key(|e| e.priority);
        ordered
    }
}
