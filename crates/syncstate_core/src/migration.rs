//! Placeholder-to-external-ID migration.
//!
//! A producer that registers before its external resource exists writes to
//! a record keyed `pending-<producer>`. Once the sync worker learns the real
//! ID, the placeholder's contributions move to the record under that ID and
//! the placeholder is removed.
//!
//! Contributions are merged into the target rather than overwriting it, so a
//! target that already has entries from other producers keeps them. The
//! placeholder delete is conditional on the version that was merged; if a
//! producer wrote to the placeholder in the meantime, its newer entries are
//! merged as well before the delete is tried again.

use crate::context::OpContext;
use crate::error::{CoreError, CoreResult};
use crate::manager::SyncStateManager;
use crate::naming::{placeholder_key, record_name};
use crate::record::StateRecord;
use crate::retry::Mutation;
use crate::types::ResourceType;
use syncstate_storage::{RecordStore, StorageError};
use tracing::{debug, info, warn};

/// Result of [`SyncStateManager::migrate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// No placeholder record exists; nothing to do.
    NoPlaceholder,
    /// The new key names the placeholder record itself; nothing to do.
    AlreadyAtKey,
    /// Contributions were moved to the record under the new key.
    Migrated {
        /// The target record after the merge.
        record: StateRecord,
        /// Number of placeholder entries carried over.
        moved_sources: usize,
        /// False if the placeholder could not be deleted and was left
        /// behind. The target is complete either way.
        placeholder_removed: bool,
    },
}

impl MigrationOutcome {
    /// Returns the target record, if a migration happened.
    pub fn record(&self) -> Option<&StateRecord> {
        match self {
            MigrationOutcome::Migrated { record, .. } => Some(record),
            _ => None,
        }
    }
}

impl<S: RecordStore> SyncStateManager<S> {
    /// Moves every contribution from the placeholder record of
    /// `producer_name` to the record keyed `new_key`.
    ///
    /// The target is created with the placeholder's scope if it does not
    /// exist. Entries already on the target are kept; for an identity on
    /// both sides the more recently written entry wins.
    ///
    /// A failed placeholder delete is logged and reported through
    /// `placeholder_removed`, not returned as an error.
    ///
    /// # Errors
    ///
    /// Fails if reading either record or writing the target fails. In that
    /// case the placeholder is untouched and the call can be repeated.
    pub fn migrate(
        &self,
        ctx: &OpContext,
        resource_type: ResourceType,
        producer_name: &str,
        new_key: &str,
    ) -> CoreResult<MigrationOutcome> {
        let old_key = placeholder_key(producer_name);
        // Keys are compared by the record they name, not by spelling.
        if record_name(resource_type, new_key) == record_name(resource_type, &old_key) {
            return Ok(MigrationOutcome::AlreadyAtKey);
        }

        let Some(placeholder) = self.get(ctx, resource_type, &old_key)? else {
            debug!(producer = producer_name, "no placeholder to migrate");
            return Ok(MigrationOutcome::NoPlaceholder);
        };

        if placeholder.is_empty() {
            // An empty record must not outlive its last source.
            self.remove_placeholder(&placeholder)
                .map_err(|e| CoreError::store("delete", placeholder.name(), e))?;
            return Ok(MigrationOutcome::NoPlaceholder);
        }

        let (target, created) =
            self.get_or_create_tracked(ctx, resource_type, new_key, &placeholder.scope)?;
        let result = self.merge_placeholder(
            ctx,
            resource_type,
            producer_name,
            new_key,
            target.clone(),
            placeholder,
        );
        if result.is_err() && created {
            self.discard_unused(&target);
        }
        result
    }

    fn merge_placeholder(
        &self,
        ctx: &OpContext,
        resource_type: ResourceType,
        producer_name: &str,
        new_key: &str,
        mut target: StateRecord,
        mut placeholder: StateRecord,
    ) -> CoreResult<MigrationOutcome> {
        let old_key = placeholder.key.clone();
        let attempts = self.config().retry.attempts();

        for attempt in 0..attempts {
            ctx.check()?;

            let incoming = placeholder.sources.clone();
            target = self
                .retrying_update(ctx, &target, |r| {
                    Ok(if r.merge_sources(&incoming) {
                        Mutation::Write
                    } else {
                        Mutation::Unchanged
                    })
                })?
                .into_record()
                .ok_or_else(|| CoreError::RecordVanished {
                    record: target.name().to_string(),
                })?;

            match self.remove_placeholder(&placeholder) {
                Ok(removed) => {
                    return Ok(self.migrated(target, &placeholder, removed, producer_name, new_key));
                }
                Err(e) if e.is_conflict() => {
                    self.stats().record_conflict();
                    warn!(
                        record = %placeholder.name(),
                        attempt,
                        "placeholder changed during migration, merging again"
                    );
                    match self.get(ctx, resource_type, &old_key)? {
                        Some(fresh) => placeholder = fresh,
                        None => {
                            return Ok(self.migrated(target, &placeholder, true, producer_name, new_key));
                        }
                    }
                }
                Err(e) => return Err(CoreError::store("delete", placeholder.name(), e)),
            }
        }

        self.stats().record_exhausted();
        Err(CoreError::RetryExhausted {
            record: placeholder.name().to_string(),
            attempts,
        })
    }

    /// Deletes the placeholder at the version it was read.
    ///
    /// Returns `Ok(false)` when the delete failed for a reason other than a
    /// version conflict; that failure is logged and the placeholder left in
    /// place. Conflicts are returned to the caller.
    fn remove_placeholder(&self, placeholder: &StateRecord) -> Result<bool, StorageError> {
        match self
            .store()
            .delete(placeholder.name(), Some(placeholder.version()))
        {
            Ok(()) | Err(StorageError::NotFound { .. }) => Ok(true),
            Err(e) if e.is_conflict() => Err(e),
            Err(e) => {
                self.stats().record_orphan();
                warn!(
                    record = %placeholder.name(),
                    error = %e,
                    "failed to delete placeholder after migration, leaving it behind"
                );
                Ok(false)
            }
        }
    }

    fn migrated(
        &self,
        record: StateRecord,
        placeholder: &StateRecord,
        placeholder_removed: bool,
        producer_name: &str,
        new_key: &str,
    ) -> MigrationOutcome {
        self.stats().record_migration();
        info!(
            producer = producer_name,
            from = %placeholder.name(),
            to = %record.name(),
            new_key,
            sources = placeholder.sources.len(),
            "migrated placeholder record"
        );
        MigrationOutcome::Migrated {
            record,
            moved_sources: placeholder.sources.len(),
            placeholder_removed,
        }
    }
}
