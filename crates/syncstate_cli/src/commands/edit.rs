//! Commands that modify records.

use super::open_manager;
use std::collections::BTreeMap;
use std::path::Path;
use syncstate_core::{MigrationOutcome, OpContext, ResourceType, SourceIdentity, SyncStatus};

/// Withdraws `source` from the record, deleting it if it ends up empty.
pub fn remove_source(
    path: &Path,
    resource_type: ResourceType,
    key: &str,
    source: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let source: SourceIdentity = source.parse()?;
    let manager = open_manager(path)?;
    let ctx = OpContext::from_config(manager.config());

    let Some(record) = manager.get(&ctx, resource_type, key)? else {
        println!("No {resource_type} record with key {key:?}");
        return Ok(());
    };
    if record.find_source(&source).is_none() {
        println!("{source} does not contribute to {}", record.name());
        return Ok(());
    }

    match manager.remove_source(&ctx, &record, &source)? {
        Some(record) => println!(
            "Removed {source}; {} source(s) remain on {}",
            record.sources.len(),
            record.name()
        ),
        None => println!("Removed {source}; {} deleted", record.name()),
    }
    Ok(())
}

/// Moves the producer's placeholder record to `new_key`.
pub fn migrate(
    path: &Path,
    resource_type: ResourceType,
    producer: &str,
    new_key: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = open_manager(path)?;
    let ctx = OpContext::from_config(manager.config());

    match manager.migrate(&ctx, resource_type, producer, new_key)? {
        MigrationOutcome::NoPlaceholder => println!("No placeholder record for {producer:?}"),
        MigrationOutcome::AlreadyAtKey => println!("{new_key:?} is the placeholder key"),
        MigrationOutcome::Migrated {
            record,
            moved_sources,
            placeholder_removed,
        } => {
            println!("Moved {moved_sources} source(s) to {}", record.name());
            if !placeholder_removed {
                println!("Warning: placeholder record could not be deleted");
            }
        }
    }
    Ok(())
}

/// Sets the sync status and merges `data` (`key=value`) into the result
/// data.
pub fn set_status(
    path: &Path,
    resource_type: ResourceType,
    key: &str,
    status: SyncStatus,
    data: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let result_data = parse_data(data)?;
    let manager = open_manager(path)?;
    let ctx = OpContext::from_config(manager.config());

    match manager.update_status(&ctx, resource_type, key, status, result_data)? {
        Some(record) => println!("{} is now {}", record.name(), record.sync_status),
        None => println!("No {resource_type} record with key {key:?}"),
    }
    Ok(())
}

fn parse_data(data: &[String]) -> Result<BTreeMap<String, String>, String> {
    data.iter()
        .map(|pair| {
            pair.split_once('=')
                .filter(|(k, _)| !k.is_empty())
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| format!("expected key=value, got {pair:?}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_pairs() {
        let data = parse_data(&["id=abc".to_string(), "url=a=b".to_string()]).unwrap();
        assert_eq!(data["id"], "abc");
        assert_eq!(data["url"], "a=b");

        assert!(parse_data(&["novalue".to_string()]).is_err());
        assert!(parse_data(&["=x".to_string()]).is_err());
    }
}
