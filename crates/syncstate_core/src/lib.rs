//! # SyncState Core
//!
//! Coordination layer that lets many independent producers contribute
//! configuration to a single external resource.
//!
//! Each external resource is represented by one shared [`StateRecord`] in a
//! versioned [`RecordStore`](syncstate_storage::RecordStore). Producers add,
//! replace and remove their own [`ContributionEntry`] on that record; a
//! downstream sync worker reads the merged record and reports back through
//! [`SyncStateManager::update_status`].
//!
//! ## Guarantees
//!
//! - One record per `(resource type, key)`, no matter how many producers race
//!   to create it
//! - A producer's write never drops another producer's entry: conflicting
//!   writes are re-applied to a fresh copy of the record
//! - A record is deleted when, and only when, its last entry is removed
//! - Placeholder records (`pending-<producer>`) migrate to the real external
//!   ID without losing contributions
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde::{Deserialize, Serialize};
//! use syncstate_core::{
//!     OpContext, RegisterRequest, ResourceConfig, ResourceService, ResourceType,
//!     SourceIdentity, SyncStateManager,
//! };
//! use syncstate_storage::InMemoryStore;
//!
//! #[derive(Serialize, Deserialize)]
//! struct AppConfig {
//!     domain: String,
//! }
//!
//! impl ResourceConfig for AppConfig {
//!     const RESOURCE_TYPE: ResourceType = ResourceType::AccessApplication;
//! }
//!
//! let manager = Arc::new(SyncStateManager::new(Arc::new(InMemoryStore::new())));
//! let apps: ResourceService<AppConfig, _> = ResourceService::new(manager);
//! let ctx = OpContext::background();
//! let source = SourceIdentity::namespaced("AccessApplication", "default", "my-app");
//!
//! let request = RegisterRequest::new(source.clone(), AppConfig { domain: "a.example".into() });
//! let record = apps.register(&ctx, &request).unwrap();
//! assert_eq!(record.name(), "access-application-pending-my-app");
//!
//! apps.update_external_id(&ctx, &source, "abc").unwrap();
//! let status = apps.get_sync_status(&ctx, &source, Some("abc")).unwrap();
//! assert_eq!(status.external_id.as_deref(), Some("abc"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod codec;
mod config;
mod context;
mod error;
mod manager;
mod migration;
mod naming;
mod record;
mod retry;
mod service;
mod stats;
mod types;

pub use codec::{decode_record, encode_record};
pub use config::{RetryConfig, SyncStateConfig, ENV_MAX_ATTEMPTS, ENV_RETRY_DELAY_MS, ENV_TIMEOUT_MS};
pub use context::{CancelHandle, OpContext};
pub use error::{CoreError, CoreResult};
pub use manager::SyncStateManager;
pub use migration::MigrationOutcome;
pub use naming::{
    hyphen_case, is_placeholder, label_value, placeholder_key, record_name, LABEL_RESOURCE_KEY,
    LABEL_RESOURCE_TYPE, MAX_NAME_LEN, PLACEHOLDER_PREFIX,
};
pub use record::{now_millis, ConfigPayload, ContributionEntry, RecordScope, StateRecord};
pub use service::{RegisterRequest, ResourceConfig, ResourceService, SyncStatusView, RESULT_ID_KEY};
pub use stats::{ManagerStats, StatsSnapshot};
pub use types::{Priority, ResourceType, SourceIdentity, SyncStatus, DEFAULT_PRIORITY};
