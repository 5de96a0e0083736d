//! CLI command implementations.

pub mod edit;
pub mod list;
pub mod show;
pub mod verify;

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use syncstate_core::{StateRecord, SyncStateConfig, SyncStateManager};
use syncstate_storage::FileStore;

/// Opens a manager over the store at `path`, configured from the
/// environment.
pub fn open_manager(path: &Path) -> Result<SyncStateManager<FileStore>, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No store found at {:?}", path).into());
    }
    let store = FileStore::open(path)?;
    let config = SyncStateConfig::from_env()?;
    Ok(SyncStateManager::with_config(Arc::new(store), config))
}

/// Printable form of a record.
#[derive(Debug, Serialize)]
pub struct RecordView {
    /// Store name.
    pub name: String,
    /// Version token.
    pub version: u64,
    /// Resource type tag.
    pub resource_type: String,
    /// Record key.
    pub key: String,
    /// Account scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_scope: Option<String>,
    /// Zone scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_scope: Option<String>,
    /// Credentials reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_ref: Option<String>,
    /// Sync status.
    pub sync_status: String,
    /// Sync result data.
    pub result_data: BTreeMap<String, String>,
    /// Contributions in priority order.
    pub sources: Vec<SourceView>,
}

/// Printable form of a contribution.
#[derive(Debug, Serialize)]
pub struct SourceView {
    /// Canonical source identity.
    pub source: String,
    /// Priority.
    pub priority: i32,
    /// Last write, Unix milliseconds.
    pub last_updated: u64,
    /// Decoded configuration, or the raw text if it is not JSON.
    pub config: serde_json::Value,
}

impl From<&StateRecord> for RecordView {
    fn from(record: &StateRecord) -> Self {
        Self {
            name: record.name().to_string(),
            version: record.version(),
            resource_type: record.resource_type.to_string(),
            key: record.key.clone(),
            account_scope: record.scope.account_scope.clone(),
            zone_scope: record.scope.zone_scope.clone(),
            credentials_ref: record.scope.credentials_ref.clone(),
            sync_status: record.sync_status.to_string(),
            result_data: record.result_data.clone(),
            sources: record
                .sources_by_priority()
                .into_iter()
                .map(|entry| SourceView {
                    source: entry.source.to_string(),
                    priority: entry.priority,
                    last_updated: entry.last_updated,
                    config: entry.config.decode().unwrap_or_else(|_| {
                        serde_json::Value::String(
                            String::from_utf8_lossy(entry.config.as_bytes()).into_owned(),
                        )
                    }),
                })
                .collect(),
        }
    }
}
