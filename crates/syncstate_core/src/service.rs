//! Per-resource-type facade used by producers.
//!
//! A [`ResourceService`] binds the generic manager to one configuration
//! type. Producers register and unregister through it without dealing with
//! record naming, placeholder keys or migration.
//!
//! Record lookup always tries the producer's placeholder record first and
//! falls back to the record under a known external ID. A producer that
//! registered before its resource existed therefore keeps finding its
//! contribution until the migration runs.

use crate::context::OpContext;
use crate::error::{CoreError, CoreResult};
use crate::manager::{serialize_config, SyncStateManager};
use crate::migration::MigrationOutcome;
use crate::naming::{is_placeholder, placeholder_key};
use crate::record::{RecordScope, StateRecord};
use crate::types::{Priority, ResourceType, SourceIdentity, SyncStatus, DEFAULT_PRIORITY};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use syncstate_storage::RecordStore;
use tracing::debug;

/// `result_data` key under which the sync worker stores the external ID.
pub const RESULT_ID_KEY: &str = "id";

/// A configuration fragment type owned by one resource type.
///
/// # Example
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use syncstate_core::{ResourceConfig, ResourceType};
///
/// #[derive(Serialize, Deserialize)]
/// struct TunnelConfig {
///     name: String,
/// }
///
/// impl ResourceConfig for TunnelConfig {
///     const RESOURCE_TYPE: ResourceType = ResourceType::Tunnel;
/// }
/// ```
pub trait ResourceConfig: Serialize + DeserializeOwned {
    /// The resource type records of this configuration belong to.
    const RESOURCE_TYPE: ResourceType;
}

/// Arguments to [`ResourceService::register`].
#[derive(Debug, Clone)]
pub struct RegisterRequest<C> {
    /// The registering producer.
    pub source: SourceIdentity,
    /// External ID, if the producer already knows it.
    pub external_id: Option<String>,
    /// Scope used if the record has to be created.
    pub scope: RecordScope,
    /// The producer's configuration.
    pub config: C,
    /// Precedence hint; lower wins downstream.
    pub priority: Priority,
}

impl<C> RegisterRequest<C> {
    /// Creates a request with no external ID, empty scope and default
    /// priority.
    pub fn new(source: SourceIdentity, config: C) -> Self {
        Self {
            source,
            external_id: None,
            scope: RecordScope::default(),
            config,
            priority: DEFAULT_PRIORITY,
        }
    }

    /// Sets a known external ID. Empty strings are treated as unknown.
    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.external_id = (!id.is_empty()).then_some(id);
        self
    }

    /// Sets the scope.
    pub fn with_scope(mut self, scope: RecordScope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// What a producer can learn about the sync state of its resource.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncStatusView {
    /// True once the sync worker marked the record synced.
    pub is_synced: bool,
    /// Current status of the record, `Pending` if there is none.
    pub status: SyncStatus,
    /// External ID, once known.
    pub external_id: Option<String>,
    /// Account scope of the record.
    pub account_scope: Option<String>,
}

/// Typed facade over [`SyncStateManager`] for one resource type.
pub struct ResourceService<C: ResourceConfig, S: RecordStore> {
    manager: Arc<SyncStateManager<S>>,
    _config: PhantomData<fn() -> C>,
}

impl<C: ResourceConfig, S: RecordStore> Clone for ResourceService<C, S> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            _config: PhantomData,
        }
    }
}

impl<C: ResourceConfig, S: RecordStore> ResourceService<C, S> {
    /// Creates a facade sharing `manager`.
    pub fn new(manager: Arc<SyncStateManager<S>>) -> Self {
        Self {
            manager,
            _config: PhantomData,
        }
    }

    /// Returns the underlying manager.
    pub fn manager(&self) -> &Arc<SyncStateManager<S>> {
        &self.manager
    }

    /// Publishes the producer's configuration.
    ///
    /// Uses the placeholder record if one exists, otherwise the record of
    /// the known external ID, otherwise creates one (under the external ID
    /// if known, the placeholder key if not).
    pub fn register(&self, ctx: &OpContext, request: &RegisterRequest<C>) -> CoreResult<StateRecord> {
        let attempts = self.manager.config().retry.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.register_once(ctx, request) {
                // Deleted by a concurrent last-source removal; start over.
                Err(CoreError::RecordVanished { record }) if attempt < attempts => {
                    debug!(record = %record, source = %request.source, attempt, "record vanished, re-registering");
                }
                result => return result,
            }
        }
    }

    fn register_once(&self, ctx: &OpContext, request: &RegisterRequest<C>) -> CoreResult<StateRecord> {
        // Serialize before touching the store so a bad config leaves nothing behind.
        let payload = serialize_config(&request.source, &request.config)?;

        let known = request.external_id.as_deref();
        let (record, created) = match self.lookup(ctx, &request.source, known)? {
            Some(record) => (record, false),
            None => {
                let key = known
                    .map(str::to_string)
                    .unwrap_or_else(|| placeholder_key(&request.source.name));
                self.manager
                    .get_or_create_tracked(ctx, C::RESOURCE_TYPE, &key, &request.scope)?
            }
        };

        let result = self.manager.update_source_payload(
            ctx,
            &record,
            &request.source,
            payload,
            request.priority,
        );
        if result.is_err() && created {
            self.manager.discard_unused(&record);
        }
        result
    }

    /// Withdraws the producer's configuration from its placeholder record
    /// and from the record of `known_external_id`.
    ///
    /// Records left without sources are deleted. Missing records are not an
    /// error.
    pub fn unregister(
        &self,
        ctx: &OpContext,
        source: &SourceIdentity,
        known_external_id: Option<&str>,
    ) -> CoreResult<()> {
        let placeholder = placeholder_key(&source.name);
        let mut keys = vec![placeholder.as_str()];
        if let Some(id) = known_external_id.filter(|id| !id.is_empty() && *id != placeholder) {
            keys.push(id);
        }

        for key in keys {
            if let Some(record) = self.manager.get(ctx, C::RESOURCE_TYPE, key)? {
                self.manager.remove_source(ctx, &record, source)?;
            }
        }
        Ok(())
    }

    /// Reports the sync state of the producer's resource.
    pub fn get_sync_status(
        &self,
        ctx: &OpContext,
        source: &SourceIdentity,
        known_external_id: Option<&str>,
    ) -> CoreResult<SyncStatusView> {
        let Some(record) = self.lookup(ctx, source, known_external_id)? else {
            return Ok(SyncStatusView::default());
        };

        let external_id = record
            .result_data
            .get(RESULT_ID_KEY)
            .filter(|id| !id.is_empty())
            .cloned()
            .or_else(|| (!is_placeholder(&record.key)).then(|| record.key.clone()));

        Ok(SyncStatusView {
            is_synced: record.sync_status == SyncStatus::Synced,
            status: record.sync_status,
            external_id,
            account_scope: record.scope.account_scope.clone(),
        })
    }

    /// Moves the producer's placeholder record to the record of `new_id`.
    pub fn update_external_id(
        &self,
        ctx: &OpContext,
        source: &SourceIdentity,
        new_id: &str,
    ) -> CoreResult<MigrationOutcome> {
        self.manager.migrate(ctx, C::RESOURCE_TYPE, &source.name, new_id)
    }

    /// Decodes the producer's own configuration from its record, if any.
    pub fn current_config(
        &self,
        ctx: &OpContext,
        source: &SourceIdentity,
        known_external_id: Option<&str>,
    ) -> CoreResult<Option<C>> {
        let Some(record) = self.lookup(ctx, source, known_external_id)? else {
            return Ok(None);
        };
        let Some(entry) = record.find_source(source) else {
            return Ok(None);
        };
        entry
            .config
            .decode()
            .map(Some)
            .map_err(|e| CoreError::Codec {
                record: record.name().to_string(),
                message: e.to_string(),
            })
    }

    fn lookup(
        &self,
        ctx: &OpContext,
        source: &SourceIdentity,
        known_external_id: Option<&str>,
    ) -> CoreResult<Option<StateRecord>> {
        let placeholder = placeholder_key(&source.name);
        if let Some(record) = self.manager.get(ctx, C::RESOURCE_TYPE, &placeholder)? {
            return Ok(Some(record));
        }
        match known_external_id.filter(|id| !id.is_empty()) {
            Some(id) => self.manager.get(ctx, C::RESOURCE_TYPE, id),
            None => Ok(None),
        }
    }
}

impl<C: ResourceConfig, S: RecordStore> std::fmt::Debug for ResourceService<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceService")
            .field("resource_type", &C::RESOURCE_TYPE)
            .finish_non_exhaustive()
    }
}
