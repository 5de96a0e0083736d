//! Optimistic-concurrency retry driver.
//!
//! Every mutating operation is expressed as a re-appliable function over a
//! [`StateRecord`]. The driver applies it to the caller's copy and tries to
//! persist the result with the version that copy was read at. On a stale
//! version it fetches the current record, applies the same function to that
//! fresh copy and tries again. The mutation is never replayed against a
//! stale in-memory record, so concurrent writers touching other sources are
//! never clobbered.

use crate::codec::{decode_record, encode_record};
use crate::context::OpContext;
use crate::error::{CoreError, CoreResult};
use crate::manager::SyncStateManager;
use crate::record::StateRecord;
use syncstate_storage::{RecordStore, StorageError};
use tracing::{debug, info, warn};

/// What an applied mutation wants persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mutation {
    /// Write the mutated record.
    Write,
    /// Delete the record, conditional on the observed version.
    Delete,
    /// Nothing changed; skip the write.
    Unchanged,
}

/// Result of a retried mutation.
#[derive(Debug)]
pub(crate) enum Applied {
    /// The record was written; carries the new version.
    Written(StateRecord),
    /// The record was deleted (or was already gone).
    Deleted,
    /// The mutation was a no-op on the current record.
    Unchanged(StateRecord),
}

impl Applied {
    /// The surviving record, if any.
    pub(crate) fn into_record(self) -> Option<StateRecord> {
        match self {
            Applied::Written(record) | Applied::Unchanged(record) => Some(record),
            Applied::Deleted => None,
        }
    }
}

impl<S: RecordStore> SyncStateManager<S> {
    /// Applies `apply` to `record` and persists the result, retrying
    /// against fresh copies on version conflicts.
    ///
    /// # Errors
    ///
    /// - `RetryExhausted` once the attempt budget is spent on conflicts
    /// - `RecordVanished` if the record was deleted underneath a write
    /// - `Cancelled` / `DeadlineExceeded` from `ctx`
    /// - any store or codec error, unretried
    pub(crate) fn retrying_update<F>(
        &self,
        ctx: &OpContext,
        record: &StateRecord,
        mut apply: F,
    ) -> CoreResult<Applied>
    where
        F: FnMut(&mut StateRecord) -> CoreResult<Mutation>,
    {
        let retry = &self.config().retry;
        let attempts = retry.attempts();
        let name = record.name().to_string();

        let mut current = record.clone();
        let mut mutation = apply(&mut current)?;

        for attempt in 0..attempts {
            ctx.check()?;
            if attempt > 0 {
                ctx.sleep(retry.delay_for_attempt(attempt))?;
            }

            let outcome = match mutation {
                Mutation::Unchanged => return Ok(Applied::Unchanged(current)),
                Mutation::Write => {
                    let data = encode_record(&current)?;
                    self.store()
                        .update(&name, current.version, &data)
                        .map(|object| {
                            current.version = object.version;
                        })
                }
                Mutation::Delete => match self.store().delete(&name, Some(current.version)) {
                    Err(StorageError::NotFound { .. }) => Ok(()),
                    other => other,
                },
            };

            match outcome {
                Ok(()) if mutation == Mutation::Delete => {
                    self.stats().record_delete();
                    info!(record = %name, attempt, "deleted record with no remaining sources");
                    return Ok(Applied::Deleted);
                }
                Ok(()) => {
                    self.stats().record_write();
                    debug!(record = %name, version = current.version, attempt, "record written");
                    return Ok(Applied::Written(current));
                }
                Err(StorageError::NotFound { .. }) => {
                    return Err(CoreError::RecordVanished { record: name });
                }
                Err(e) if e.is_conflict() => {
                    self.stats().record_conflict();
                    warn!(
                        record = %name,
                        attempt,
                        stale_version = current.version,
                        "version conflict, re-applying to fresh copy"
                    );

                    let fresh = self
                        .store()
                        .get(&name)
                        .map_err(|e| CoreError::store("refetch", name.as_str(), e))?;
                    let Some(fresh) = fresh else {
                        if mutation == Mutation::Delete {
                            return Ok(Applied::Deleted);
                        }
                        return Err(CoreError::RecordVanished { record: name });
                    };

                    current = decode_record(fresh)?;
                    mutation = apply(&mut current)?;
                }
                Err(e) => {
                    let operation = if mutation == Mutation::Delete {
                        "delete"
                    } else {
                        "update"
                    };
                    return Err(CoreError::store(operation, name, e));
                }
            }
        }

        self.stats().record_exhausted();
        warn!(record = %name, attempts, "retry budget exhausted");
        Err(CoreError::RetryExhausted {
            record: name,
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetryConfig, SyncStateConfig};
    use crate::record::RecordScope;
    use crate::types::ResourceType;
    use std::sync::Arc;
    use std::time::Duration;
    use syncstate_storage::{FaultyStore, InMemoryStore};

    fn manager(attempts: u32) -> SyncStateManager<FaultyStore<InMemoryStore>> {
        let config = SyncStateConfig::new().with_retry(
            RetryConfig::new(attempts)
                .with_initial_delay(Duration::from_millis(1))
                .with_jitter(0.0),
        );
        SyncStateManager::with_config(Arc::new(FaultyStore::new(InMemoryStore::new())), config)
    }

    fn seeded(manager: &SyncStateManager<FaultyStore<InMemoryStore>>) -> StateRecord {
        manager
            .get_or_create(
                &OpContext::background(),
                ResourceType::Tunnel,
                "abc",
                &RecordScope::new(),
            )
            .unwrap()
    }

    #[test]
    fn write_succeeds_first_time() {
        let manager = manager(5);
        let record = seeded(&manager);

        let applied = manager
            .retrying_update(&OpContext::background(), &record, |r| {
                r.result_data.insert("k".into(), "v".into());
                Ok(Mutation::Write)
            })
            .unwrap();

        let written = applied.into_record().unwrap();
        assert_eq!(written.version(), 2);
        assert_eq!(manager.store().update_calls(), 1);
    }

    #[test]
    fn conflict_reapplies_to_fresh_copy() {
        let manager = manager(5);
        let record = seeded(&manager);

        // A competing writer bumps the version between our read and write.
        let name = record.name().to_string();
        let competitor = {
            let mut r = record.clone();
            r.result_data.insert("other".into(), "1".into());
            encode_record(&r).unwrap()
        };
        manager.store().before_next_update(move |inner| {
            inner.update(&name, 1, &competitor).unwrap();
        });

        let mut applications = 0;
        let written = manager
            .retrying_update(&OpContext::background(), &record, |r| {
                applications += 1;
                r.result_data.insert("mine".into(), "1".into());
                Ok(Mutation::Write)
            })
            .unwrap()
            .into_record()
            .unwrap();

        assert_eq!(applications, 2);
        assert_eq!(written.result_data.get("other").map(String::as_str), Some("1"));
        assert_eq!(written.result_data.get("mine").map(String::as_str), Some("1"));
        assert_eq!(manager.stats().snapshot().conflicts_retried, 1);
    }

    #[test]
    fn exhaustion_is_reported() {
        let manager = manager(3);
        let record = seeded(&manager);
        manager.store().inject_update_conflicts(10);

        let err = manager
            .retrying_update(&OpContext::background(), &record, |_| Ok(Mutation::Write))
            .unwrap_err();

        assert!(matches!(err, CoreError::RetryExhausted { attempts: 3, .. }));
        assert_eq!(manager.store().update_calls(), 3);
        assert_eq!(manager.stats().snapshot().retries_exhausted, 1);
    }

    #[test]
    fn zero_budget_still_writes_once() {
        let retry = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::no_retry()
        };
        let manager = SyncStateManager::with_config(
            Arc::new(FaultyStore::new(InMemoryStore::new())),
            SyncStateConfig::new().with_retry(retry),
        );
        let record = seeded(&manager);

        let written = manager
            .retrying_update(&OpContext::background(), &record, |_| Ok(Mutation::Write))
            .unwrap();
        assert!(matches!(written, Applied::Written(_)));
        assert_eq!(manager.store().update_calls(), 1);

        manager.store().inject_update_conflicts(1);
        let current = written.into_record().unwrap();
        let err = manager
            .retrying_update(&OpContext::background(), &current, |_| Ok(Mutation::Write))
            .unwrap_err();
        assert!(matches!(err, CoreError::RetryExhausted { attempts: 1, .. }));
    }

    #[test]
    fn deadline_aborts_retries() {
        let config = SyncStateConfig::new().with_retry(
            RetryConfig::new(50)
                .with_initial_delay(Duration::from_millis(200))
                .with_jitter(0.0),
        );
        let manager =
            SyncStateManager::with_config(Arc::new(FaultyStore::new(InMemoryStore::new())), config);
        let record = seeded(&manager);
        manager.store().inject_update_conflicts(100);

        let ctx = OpContext::with_timeout(Duration::from_millis(50));
        let err = manager
            .retrying_update(&ctx, &record, |_| Ok(Mutation::Write))
            .unwrap_err();

        assert!(matches!(err, CoreError::DeadlineExceeded));
        assert!(manager.store().update_calls() < 50);
    }

    #[test]
    fn cancelled_context_writes_nothing() {
        let manager = manager(5);
        let record = seeded(&manager);
        let ctx = OpContext::background();
        ctx.cancel_handle().cancel();

        let err = manager
            .retrying_update(&ctx, &record, |_| Ok(Mutation::Write))
            .unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
        assert_eq!(manager.store().update_calls(), 0);
    }

    #[test]
    fn unchanged_skips_store() {
        let manager = manager(5);
        let record = seeded(&manager);

        let applied = manager
            .retrying_update(&OpContext::background(), &record, |_| Ok(Mutation::Unchanged))
            .unwrap();
        assert!(matches!(applied, Applied::Unchanged(_)));
        assert_eq!(manager.store().update_calls(), 0);
    }

    #[test]
    fn store_errors_are_not_retried() {
        let manager = manager(5);
        let record = seeded(&manager);
        manager.store().set_unavailable(true);

        let err = manager
            .retrying_update(&OpContext::background(), &record, |_| Ok(Mutation::Write))
            .unwrap_err();
        assert!(matches!(err, CoreError::Store { operation: "update", .. }));
        assert_eq!(manager.store().update_calls(), 1);
    }

    #[test]
    fn delete_of_missing_record_is_success() {
        let manager = manager(5);
        let record = seeded(&manager);
        manager
            .store()
            .inner()
            .delete(record.name(), None)
            .unwrap();

        let applied = manager
            .retrying_update(&OpContext::background(), &record, |_| Ok(Mutation::Delete))
            .unwrap();
        assert!(matches!(applied, Applied::Deleted));
    }

    #[test]
    fn write_to_missing_record_vanishes() {
        let manager = manager(5);
        let record = seeded(&manager);
        manager
            .store()
            .inner()
            .delete(record.name(), None)
            .unwrap();

        let err = manager
            .retrying_update(&OpContext::background(), &record, |_| Ok(Mutation::Write))
            .unwrap_err();
        assert!(matches!(err, CoreError::RecordVanished { .. }));
    }
}
