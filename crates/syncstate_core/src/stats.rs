//! Coordination statistics.
//!
//! Counters for how often records are created, written, deleted and
//! migrated, and how much contention the retry driver absorbed.
//!
//! # Usage
//!
//! ```rust,ignore
//! let stats = manager.stats().snapshot();
//! println!("conflicts retried: {}", stats.conflicts_retried);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Coordination counters.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct ManagerStats {
    /// Records created.
    records_created: AtomicU64,
    /// Creates that lost a race and adopted the winner's record.
    create_races: AtomicU64,
    /// Successful record writes.
    writes: AtomicU64,
    /// Records deleted.
    deletes: AtomicU64,
    /// Version conflicts absorbed by re-applying a mutation.
    conflicts_retried: AtomicU64,
    /// Operations that ran out of attempts.
    retries_exhausted: AtomicU64,
    /// Placeholder records migrated to a real key.
    migrations: AtomicU64,
    /// Migrations that left the placeholder behind.
    orphaned_placeholders: AtomicU64,
}

impl ManagerStats {
    /// Creates a zeroed stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_create(&self) {
        self.records_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_create_race(&self) {
        self.create_races.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict(&self) {
        self.conflicts_retried.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_exhausted(&self) {
        self.retries_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_migration(&self) {
        self.migrations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_orphan(&self) {
        self.orphaned_placeholders.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            records_created: self.records_created.load(Ordering::Relaxed),
            create_races: self.create_races.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            conflicts_retried: self.conflicts_retried.load(Ordering::Relaxed),
            retries_exhausted: self.retries_exhausted.load(Ordering::Relaxed),
            migrations: self.migrations.load(Ordering::Relaxed),
            orphaned_placeholders: self.orphaned_placeholders.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`ManagerStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Records created.
    pub records_created: u64,
    /// Creates that lost a race and adopted the winner's record.
    pub create_races: u64,
    /// Successful record writes.
    pub writes: u64,
    /// Records deleted.
    pub deletes: u64,
    /// Version conflicts absorbed by re-applying a mutation.
    pub conflicts_retried: u64,
    /// Operations that ran out of attempts.
    pub retries_exhausted: u64,
    /// Placeholder records migrated to a real key.
    pub migrations: u64,
    /// Migrations that left the placeholder behind.
    pub orphaned_placeholders: u64,
}
