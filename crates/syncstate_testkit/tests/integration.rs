//! Cross-crate integration tests: producers driving the typed facade over
//! every store implementation.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use syncstate_core::{
    MigrationOutcome, RegisterRequest, ResourceConfig, ResourceService, SyncStatus,
    RESULT_ID_KEY,
};
use syncstate_storage::RecordStore;
use syncstate_testkit::prelude::*;
use syncstate_testkit::scenarios::{producer, reload};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TunnelConfig {
    name: String,
    replicas: u32,
}

impl ResourceConfig for TunnelConfig {
    const RESOURCE_TYPE: ResourceType = ResourceType::Tunnel;
}

fn tunnel(name: &str) -> TunnelConfig {
    TunnelConfig {
        name: name.to_string(),
        replicas: 2,
    }
}

fn lifecycle<S: RecordStore>(manager: SyncStateManager<S>) {
    let tunnels: ResourceService<TunnelConfig, S> = ResourceService::new(Arc::new(manager));
    let owner = producer("edge");
    let helper = SourceIdentity::namespaced("TunnelBinding", "default", "edge-binding");

    // Registered before the tunnel exists.
    let record = tunnels
        .register(
            &ctx(),
            &RegisterRequest::new(owner.clone(), tunnel("edge"))
                .with_scope(RecordScope::new().with_account("acc-1")),
        )
        .unwrap();
    assert_eq!(record.name(), "tunnel-pending-edge");

    // The sync worker creates it and reports back.
    let mut data = std::collections::BTreeMap::new();
    data.insert(RESULT_ID_KEY.to_string(), "6f1c".to_string());
    tunnels
        .manager()
        .update_status(&ctx(), ResourceType::Tunnel, "pending-edge", SyncStatus::Synced, data)
        .unwrap();
    let status = tunnels.get_sync_status(&ctx(), &owner, None).unwrap();
    assert!(status.is_synced);
    assert_eq!(status.external_id.as_deref(), Some("6f1c"));
    assert_eq!(status.account_scope.as_deref(), Some("acc-1"));

    let outcome = tunnels.update_external_id(&ctx(), &owner, "6f1c").unwrap();
    assert!(matches!(
        outcome,
        MigrationOutcome::Migrated {
            moved_sources: 1,
            placeholder_removed: true,
            ..
        }
    ));

    // A second producer attaches through the known ID.
    tunnels
        .register(
            &ctx(),
            &RegisterRequest::new(helper.clone(), tunnel("edge")).with_external_id("6f1c"),
        )
        .unwrap();
    let record = reload(tunnels.manager(), ResourceType::Tunnel, "6f1c");
    assert_eq!(record.sources.len(), 2);
    assert_eq!(record.scope.account_scope.as_deref(), Some("acc-1"));
    assert_eq!(
        tunnels.current_config(&ctx(), &owner, Some("6f1c")).unwrap(),
        Some(tunnel("edge"))
    );

    tunnels.unregister(&ctx(), &owner, Some("6f1c")).unwrap();
    assert_eq!(reload(tunnels.manager(), ResourceType::Tunnel, "6f1c").sources.len(), 1);

    tunnels.unregister(&ctx(), &helper, Some("6f1c")).unwrap();
    assert!(tunnels
        .manager()
        .get(&ctx(), ResourceType::Tunnel, "6f1c")
        .unwrap()
        .is_none());
    assert!(tunnels
        .manager()
        .list(&ctx(), ResourceType::Tunnel)
        .unwrap()
        .is_empty());
}

#[test]
fn lifecycle_in_memory() {
    init_test_logging();
    lifecycle(memory_manager());
}

#[test]
fn lifecycle_on_file_store() {
    init_test_logging();
    let fixture = TestFileManager::new();
    lifecycle(fixture.reopen());
}

#[test]
fn lifecycle_with_faulty_store() {
    init_test_logging();
    let manager = faulty_manager();
    manager.store().inject_update_conflicts(2);
    lifecycle(manager);
}

#[test]
fn concurrent_registrations_through_facade() {
    init_test_logging();
    let manager = Arc::new(SyncStateManager::with_config(
        Arc::new(syncstate_storage::InMemoryStore::new()),
        syncstate_core::SyncStateConfig::new().with_retry(
            syncstate_core::RetryConfig::new(500)
                .with_initial_delay(std::time::Duration::from_micros(200))
                .with_jitter(1.0),
        ),
    ));
    let tunnels: ResourceService<TunnelConfig, _> = ResourceService::new(Arc::clone(&manager));

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let tunnels = tunnels.clone();
            thread::spawn(move || {
                let source = SourceIdentity::namespaced("Binding", "ns", format!("b{i}"));
                tunnels
                    .register(
                        &ctx(),
                        &RegisterRequest::new(source, tunnel("shared")).with_external_id("t-1"),
                    )
                    .unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let record = reload(&manager, ResourceType::Tunnel, "t-1");
    assert_eq!(record.sources.len(), 5);
}

#[test]
fn churn_leaves_no_empty_records() {
    init_test_logging();
    let manager = Arc::new(memory_manager());
    let config = StressConfig {
        producers: 4,
        rounds: 10,
        ..Default::default()
    };

    let result = stress_register_churn(Arc::clone(&manager), &config);
    result.print_summary("register churn");

    let survivor = manager
        .get(&ctx(), config.resource_type, &config.key)
        .unwrap();
    if result.failed_ops == 0 {
        assert!(survivor.is_none());
    }
}
