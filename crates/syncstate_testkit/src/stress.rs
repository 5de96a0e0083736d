//! Stress runs for SyncState.
//!
//! These drive many producers against the same record from separate
//! threads and report how the retry driver coped.

use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use syncstate_core::{
    OpContext, RecordScope, ResourceType, SourceIdentity, StatsSnapshot, SyncStateManager,
};
use syncstate_storage::RecordStore;

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Manager counters at the end of the run.
    pub stats: StatsSnapshot,
}

impl StressTestResult {
    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Conflicts retried: {}", self.stats.conflicts_retried);
        println!("Retries exhausted: {}", self.stats.retries_exhausted);
    }
}

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent producers, one thread each.
    pub producers: usize,
    /// Updates each producer performs.
    pub rounds: usize,
    /// Resource type of the shared record.
    pub resource_type: ResourceType,
    /// Key of the shared record.
    pub key: String,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            producers: 8,
            rounds: 20,
            resource_type: ResourceType::Tunnel,
            key: "shared".to_string(),
        }
    }
}

/// Source identity of producer `index` in a stress run.
pub fn stress_producer(index: usize) -> SourceIdentity {
    SourceIdentity::namespaced("StressProducer", "stress", format!("p{index}"))
}

/// Every producer repeatedly writes its own entry to the shared record,
/// each round starting from a freshly read copy.
///
/// When every operation succeeds, the record ends up with exactly one
/// entry per producer.
pub fn stress_concurrent_contributions<S>(
    manager: Arc<SyncStateManager<S>>,
    config: &StressConfig,
) -> StressTestResult
where
    S: RecordStore + 'static,
{
    run_producers(manager, config, |manager, config, source, round| {
        let ctx = OpContext::background();
        let record =
            manager.get_or_create(&ctx, config.resource_type, &config.key, &RecordScope::new())?;
        manager.update_source(&ctx, &record, source, &json!({ "round": round }), 100)?;
        Ok(())
    })
}

/// Every producer alternately adds and removes its entry.
///
/// Records may be deleted and recreated many times over. When every
/// operation succeeds, nothing remains afterwards.
pub fn stress_register_churn<S>(
    manager: Arc<SyncStateManager<S>>,
    config: &StressConfig,
) -> StressTestResult
where
    S: RecordStore + 'static,
{
    run_producers(manager, config, |manager, config, source, round| {
        let ctx = OpContext::background();
        let record =
            manager.get_or_create(&ctx, config.resource_type, &config.key, &RecordScope::new())?;
        let record = manager.update_source(&ctx, &record, source, &json!({ "round": round }), 100)?;
        manager.remove_source(&ctx, &record, source)?;
        Ok(())
    })
}

type ProducerStep<S> = fn(
    &SyncStateManager<S>,
    &StressConfig,
    &SourceIdentity,
    usize,
) -> syncstate_core::CoreResult<()>;

fn run_producers<S>(
    manager: Arc<SyncStateManager<S>>,
    config: &StressConfig,
    step: ProducerStep<S>,
) -> StressTestResult
where
    S: RecordStore + 'static,
{
    let start = Instant::now();

    let handles: Vec<_> = (0..config.producers)
        .map(|index| {
            let manager = Arc::clone(&manager);
            let config = config.clone();
            thread::spawn(move || {
                let source = stress_producer(index);
                let mut successful = 0usize;
                let mut failed = 0usize;
                for round in 0..config.rounds {
                    match step(&manager, &config, &source, round) {
                        Ok(()) => successful += 1,
                        Err(e) => {
                            tracing::debug!(source = %source, round, error = %e, "stress step failed");
                            failed += 1;
                        }
                    }
                }
                (successful, failed)
            })
        })
        .collect();

    let (mut successful, mut failed) = (0usize, 0usize);
    for handle in handles {
        let (ok, err) = handle.join().expect("producer thread panicked");
        successful += ok;
        failed += err;
    }

    StressTestResult {
        total_ops: successful + failed,
        successful_ops: successful,
        failed_ops: failed,
        duration: start.elapsed(),
        stats: manager.stats().snapshot(),
    }
}
