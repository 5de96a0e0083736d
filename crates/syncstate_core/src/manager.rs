//! The SyncState manager.
//!
//! [`SyncStateManager`] is the entry point producers use to publish and
//! withdraw their configuration. It owns no caches: every operation reads
//! the backing store and writes through the retry driver.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use syncstate_core::{OpContext, RecordScope, ResourceType, SourceIdentity, SyncStateManager};
//! use syncstate_storage::InMemoryStore;
//!
//! let manager = SyncStateManager::new(Arc::new(InMemoryStore::new()));
//! let ctx = OpContext::background();
//! let source = SourceIdentity::namespaced("ClusterTunnel", "ops", "main");
//!
//! let record = manager
//!     .get_or_create(&ctx, ResourceType::Tunnel, "pending-main", &RecordScope::new())
//!     .unwrap();
//! let record = manager
//!     .update_source(&ctx, &record, &source, &serde_json::json!({ "name": "main" }), 100)
//!     .unwrap();
//! assert_eq!(record.sources.len(), 1);
//!
//! assert!(manager.remove_source(&ctx, &record, &source).unwrap().is_none());
//! ```

use crate::codec::{decode_record, encode_record};
use crate::config::SyncStateConfig;
use crate::context::OpContext;
use crate::error::{CoreError, CoreResult};
use crate::naming::{hyphen_case, record_name, LABEL_RESOURCE_TYPE};
use crate::record::{ConfigPayload, ContributionEntry, RecordScope, StateRecord};
use crate::retry::{Applied, Mutation};
use crate::stats::ManagerStats;
use crate::types::{Priority, ResourceType, SourceIdentity, SyncStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use syncstate_storage::{Labels, RecordStore};
use tracing::{debug, info, warn};

/// Coordinates producers' contributions to shared state records.
///
/// The manager is `Send + Sync` and is meant to be shared behind an `Arc`
/// by every producer in the process.
pub struct SyncStateManager<S: RecordStore> {
    store: Arc<S>,
    config: SyncStateConfig,
    stats: ManagerStats,
}

impl<S: RecordStore> SyncStateManager<S> {
    /// Creates a manager with default configuration.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, SyncStateConfig::default())
    }

    /// Creates a manager with the given configuration.
    pub fn with_config(store: Arc<S>, config: SyncStateConfig) -> Self {
        Self {
            store,
            config,
            stats: ManagerStats::new(),
        }
    }

    /// Returns the backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncStateConfig {
        &self.config
    }

    /// Returns the coordination counters.
    pub fn stats(&self) -> &ManagerStats {
        &self.stats
    }

    /// Fetches the record for `(resource_type, key)`.
    ///
    /// Returns `Ok(None)` if it does not exist.
    pub fn get(
        &self,
        ctx: &OpContext,
        resource_type: ResourceType,
        key: &str,
    ) -> CoreResult<Option<StateRecord>> {
        ctx.check()?;
        let name = record_name(resource_type, key);
        self.fetch(&name, key)
    }

    /// Fetches the record for `(resource_type, key)`, creating it with no
    /// sources and `scope` if it does not exist.
    ///
    /// Concurrent callers racing to create the same record all end up with
    /// the single stored copy. The scope of an existing record is never
    /// changed.
    ///
    /// # Errors
    ///
    /// Returns `RecordVanished` if the record was created by someone else
    /// and deleted again before it could be read.
    pub fn get_or_create(
        &self,
        ctx: &OpContext,
        resource_type: ResourceType,
        key: &str,
        scope: &RecordScope,
    ) -> CoreResult<StateRecord> {
        self.get_or_create_tracked(ctx, resource_type, key, scope)
            .map(|(record, _)| record)
    }

    /// Like [`SyncStateManager::get_or_create`], also reporting whether this
    /// call created the record.
    pub(crate) fn get_or_create_tracked(
        &self,
        ctx: &OpContext,
        resource_type: ResourceType,
        key: &str,
        scope: &RecordScope,
    ) -> CoreResult<(StateRecord, bool)> {
        ctx.check()?;
        let name = record_name(resource_type, key);
        if let Some(record) = self.fetch(&name, key)? {
            return Ok((record, false));
        }

        let mut record = StateRecord::new(resource_type, key, scope.clone());
        let data = encode_record(&record)?;
        match self.store.create(&name, &record.labels(), &data) {
            Ok(object) => {
                record.version = object.version;
                self.stats.record_create();
                info!(record = %name, resource_type = %resource_type, key, "created state record");
                Ok((record, true))
            }
            Err(e) if e.is_already_exists() => {
                self.stats.record_create_race();
                debug!(record = %name, "lost create race, adopting existing record");
                self.fetch(&name, key)?
                    .map(|record| (record, false))
                    .ok_or(CoreError::RecordVanished { record: name })
            }
            Err(e) => Err(CoreError::store("create", name, e)),
        }
    }

    /// Deletes a record this caller created if it is still empty and
    /// untouched since `created` was read. Used when the first write to a
    /// fresh record failed; anyone else's write keeps it alive.
    pub(crate) fn discard_unused(&self, created: &StateRecord) {
        if !created.is_empty() {
            return;
        }
        match self.store.delete(created.name(), Some(created.version())) {
            Ok(()) => {
                self.stats.record_delete();
                debug!(record = %created.name(), "discarded unused empty record");
            }
            Err(e) if e.is_not_found() || e.is_conflict() => {}
            Err(e) => warn!(
                record = %created.name(),
                error = %e,
                "failed to discard unused empty record"
            ),
        }
    }

    /// Inserts or replaces `source`'s contribution on `record`.
    ///
    /// `config` is serialized to JSON once; the entry is stamped with the
    /// current time. Every other source's entry is preserved.
    ///
    /// # Errors
    ///
    /// - `ConfigSerialization` if `config` cannot be serialized; nothing is written
    /// - `RecordVanished` if the record was deleted concurrently
    /// - `RetryExhausted` under sustained contention
    pub fn update_source<C: Serialize + ?Sized>(
        &self,
        ctx: &OpContext,
        record: &StateRecord,
        source: &SourceIdentity,
        config: &C,
        priority: Priority,
    ) -> CoreResult<StateRecord> {
        let payload = serialize_config(source, config)?;
        self.update_source_payload(ctx, record, source, payload, priority)
    }

    /// Like [`SyncStateManager::update_source`] with an already-serialized
    /// payload.
    pub fn update_source_payload(
        &self,
        ctx: &OpContext,
        record: &StateRecord,
        source: &SourceIdentity,
        payload: ConfigPayload,
        priority: Priority,
    ) -> CoreResult<StateRecord> {
        let entry = ContributionEntry::new(source.clone(), payload, priority);

        let applied = self.retrying_update(ctx, record, |r| {
            r.upsert_source(entry.clone());
            Ok(Mutation::Write)
        })?;

        debug!(record = %record.name(), source = %source, priority, "source updated");
        applied.into_record().ok_or_else(|| CoreError::RecordVanished {
            record: record.name().to_string(),
        })
    }

    /// Removes `source`'s contribution from `record`.
    ///
    /// If no sources remain the record is deleted and `Ok(None)` is
    /// returned. Removing an absent source, or removing from a record that is
    /// already gone, succeeds.
    pub fn remove_source(
        &self,
        ctx: &OpContext,
        record: &StateRecord,
        source: &SourceIdentity,
    ) -> CoreResult<Option<StateRecord>> {
        let applied = self.retrying_update(ctx, record, |r| {
            let removed = r.remove_source(source);
            Ok(if r.is_empty() {
                Mutation::Delete
            } else if removed {
                Mutation::Write
            } else {
                Mutation::Unchanged
            })
        });

        match applied {
            Ok(applied) => {
                debug!(record = %record.name(), source = %source, "source removed");
                Ok(applied.into_record())
            }
            Err(CoreError::RecordVanished { .. }) => {
                debug!(record = %record.name(), source = %source, "record already gone");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Records the downstream sync result on the record for
    /// `(resource_type, key)`.
    ///
    /// `result_data` entries are merged over the existing ones. Returns
    /// `Ok(None)` if the record does not exist. Sources are untouched.
    pub fn update_status(
        &self,
        ctx: &OpContext,
        resource_type: ResourceType,
        key: &str,
        status: SyncStatus,
        result_data: BTreeMap<String, String>,
    ) -> CoreResult<Option<StateRecord>> {
        let Some(record) = self.get(ctx, resource_type, key)? else {
            return Ok(None);
        };

        let applied = self.retrying_update(ctx, &record, |r| {
            let before = (r.sync_status, r.result_data.clone());
            r.sync_status = status;
            r.result_data
                .extend(result_data.iter().map(|(k, v)| (k.clone(), v.clone())));
            Ok(if before == (r.sync_status, r.result_data.clone()) {
                Mutation::Unchanged
            } else {
                Mutation::Write
            })
        });

        match applied {
            Ok(applied) => {
                debug!(record = %record.name(), status = %status, "sync status updated");
                Ok(applied.into_record())
            }
            Err(CoreError::RecordVanished { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Lists every record of `resource_type`, ordered by name.
    pub fn list(&self, ctx: &OpContext, resource_type: ResourceType) -> CoreResult<Vec<StateRecord>> {
        ctx.check()?;
        let mut selector = Labels::new();
        selector.insert(
            LABEL_RESOURCE_TYPE.to_string(),
            hyphen_case(resource_type.as_str()),
        );

        self.store
            .list(&selector)
            .map_err(|e| CoreError::store("list", resource_type.as_str(), e))?
            .into_iter()
            .map(decode_record)
            .collect()
    }

    fn fetch(&self, name: &str, key: &str) -> CoreResult<Option<StateRecord>> {
        let Some(object) = self
            .store
            .get(name)
            .map_err(|e| CoreError::store("get", name, e))?
        else {
            return Ok(None);
        };

        let record = decode_record(object)?;
        if record.key != key {
            warn!(
                record = %name,
                requested = key,
                stored = %record.key,
                "keys collide on the same record name"
            );
        }
        Ok(Some(record))
    }
}

/// Serializes a producer's configuration, attributing failures to `source`.
pub(crate) fn serialize_config<C: Serialize + ?Sized>(
    source: &SourceIdentity,
    config: &C,
) -> CoreResult<ConfigPayload> {
    ConfigPayload::from_json(config).map_err(|error| CoreError::ConfigSerialization {
        source_id: source.to_string(),
        error,
    })
}

impl<S: RecordStore> std::fmt::Debug for SyncStateManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncStateManager")
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use syncstate_storage::InMemoryStore;

    fn manager() -> SyncStateManager<InMemoryStore> {
        SyncStateManager::new(Arc::new(InMemoryStore::new()))
    }

    fn ctx() -> OpContext {
        OpContext::background()
    }

    #[test]
    fn get_missing_is_none() {
        let manager = manager();
        assert!(manager
            .get(&ctx(), ResourceType::Tunnel, "nope")
            .unwrap()
            .is_none());
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let manager = manager();
        let scope = RecordScope::new().with_account("acc-1");

        let first = manager
            .get_or_create(&ctx(), ResourceType::Tunnel, "abc", &scope)
            .unwrap();
        let second = manager
            .get_or_create(
                &ctx(),
                ResourceType::Tunnel,
                "abc",
                &RecordScope::new().with_account("other"),
            )
            .unwrap();

        assert_eq!(first.version(), 1);
        assert_eq!(first, second);
        assert_eq!(second.scope.account_scope.as_deref(), Some("acc-1"));
        assert_eq!(manager.store().len(), 1);
        assert_eq!(manager.stats().snapshot().records_created, 1);
    }

    #[test]
    fn update_source_preserves_others() {
        let manager = manager();
        let a = SourceIdentity::new("A", "a");
        let b = SourceIdentity::new("B", "b");

        let record = manager
            .get_or_create(&ctx(), ResourceType::DnsRecord, "r1", &RecordScope::new())
            .unwrap();
        let record = manager
            .update_source(&ctx(), &record, &a, &json!({ "ttl": 60 }), 100)
            .unwrap();
        let record = manager
            .update_source(&ctx(), &record, &b, &json!({ "ttl": 120 }), 10)
            .unwrap();
        let record = manager
            .update_source(&ctx(), &record, &a, &json!({ "ttl": 30 }), 100)
            .unwrap();

        assert_eq!(record.sources.len(), 2);
        let value: serde_json::Value = record.find_source(&a).unwrap().config.decode().unwrap();
        assert_eq!(value["ttl"], 30);

        let stored = manager
            .get(&ctx(), ResourceType::DnsRecord, "r1")
            .unwrap()
            .unwrap();
        assert_eq!(stored, record);
    }

    #[test]
    fn stale_record_does_not_clobber() {
        let manager = manager();
        let a = SourceIdentity::new("A", "a");
        let b = SourceIdentity::new("B", "b");

        let stale = manager
            .get_or_create(&ctx(), ResourceType::Tunnel, "t", &RecordScope::new())
            .unwrap();
        manager
            .update_source(&ctx(), &stale, &a, &json!({}), 100)
            .unwrap();

        // Written from the version-1 copy; must not drop A.
        let record = manager
            .update_source(&ctx(), &stale, &b, &json!({}), 100)
            .unwrap();
        assert!(record.find_source(&a).is_some());
        assert!(record.find_source(&b).is_some());
        assert_eq!(manager.stats().snapshot().conflicts_retried, 1);
    }

    #[test]
    fn unserializable_config_writes_nothing() {
        let manager = manager();
        let record = manager
            .get_or_create(&ctx(), ResourceType::Tunnel, "t", &RecordScope::new())
            .unwrap();

        let mut bad = std::collections::HashMap::new();
        bad.insert(vec![1u8], 1);
        let err = manager
            .update_source(&ctx(), &record, &SourceIdentity::new("A", "a"), &bad, 1)
            .unwrap_err();

        assert!(matches!(err, CoreError::ConfigSerialization { ref source_id, .. } if source_id == "A/a"));
        assert_eq!(manager.stats().snapshot().writes, 0);
    }

    #[test]
    fn removing_last_source_deletes_record() {
        let manager = manager();
        let a = SourceIdentity::new("A", "a");
        let b = SourceIdentity::new("B", "b");

        let record = manager
            .get_or_create(&ctx(), ResourceType::Tunnel, "t", &RecordScope::new())
            .unwrap();
        let record = manager.update_source(&ctx(), &record, &a, &json!({}), 1).unwrap();
        let record = manager.update_source(&ctx(), &record, &b, &json!({}), 1).unwrap();

        let record = manager.remove_source(&ctx(), &record, &a).unwrap().unwrap();
        assert_eq!(record.sources.len(), 1);

        assert!(manager.remove_source(&ctx(), &record, &b).unwrap().is_none());
        assert!(manager.store().is_empty());
        assert_eq!(manager.stats().snapshot().deletes, 1);
    }

    #[test]
    fn removing_absent_source_is_noop() {
        let manager = manager();
        let a = SourceIdentity::new("A", "a");

        let record = manager
            .get_or_create(&ctx(), ResourceType::Tunnel, "t", &RecordScope::new())
            .unwrap();
        let record = manager.update_source(&ctx(), &record, &a, &json!({}), 1).unwrap();

        let after = manager
            .remove_source(&ctx(), &record, &SourceIdentity::new("Z", "z"))
            .unwrap()
            .unwrap();
        assert_eq!(after.version(), record.version());
    }

    #[test]
    fn removing_from_deleted_record_succeeds() {
        let manager = manager();
        let a = SourceIdentity::new("A", "a");

        let record = manager
            .get_or_create(&ctx(), ResourceType::Tunnel, "t", &RecordScope::new())
            .unwrap();
        let record = manager.update_source(&ctx(), &record, &a, &json!({}), 1).unwrap();
        assert!(manager.remove_source(&ctx(), &record, &a).unwrap().is_none());
        assert!(manager.remove_source(&ctx(), &record, &a).unwrap().is_none());
    }

    #[test]
    fn update_status_merges_result_data() {
        let manager = manager();
        let record = manager
            .get_or_create(&ctx(), ResourceType::Tunnel, "t", &RecordScope::new())
            .unwrap();
        manager
            .update_source(&ctx(), &record, &SourceIdentity::new("A", "a"), &json!({}), 1)
            .unwrap();

        let mut data = BTreeMap::new();
        data.insert("id".to_string(), "abc".to_string());
        let updated = manager
            .update_status(&ctx(), ResourceType::Tunnel, "t", SyncStatus::Synced, data)
            .unwrap()
            .unwrap();

        assert_eq!(updated.sync_status, SyncStatus::Synced);
        assert_eq!(updated.result_data["id"], "abc");
        assert_eq!(updated.sources.len(), 1);

        assert!(manager
            .update_status(&ctx(), ResourceType::Tunnel, "gone", SyncStatus::Error, BTreeMap::new())
            .unwrap()
            .is_none());
    }

    #[test]
    fn list_filters_by_type() {
        let manager = manager();
        for key in ["b", "a"] {
            manager
                .get_or_create(&ctx(), ResourceType::Tunnel, key, &RecordScope::new())
                .unwrap();
        }
        manager
            .get_or_create(&ctx(), ResourceType::VirtualNetwork, "a", &RecordScope::new())
            .unwrap();

        let tunnels = manager.list(&ctx(), ResourceType::Tunnel).unwrap();
        let keys: Vec<_> = tunnels.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn cancelled_context_is_rejected() {
        let manager = manager();
        let ctx = ctx();
        ctx.cancel_handle().cancel();
        let err = manager
            .get_or_create(&ctx, ResourceType::Tunnel, "t", &RecordScope::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
        assert!(manager.store().is_empty());
    }
}
