//! Show command implementation.

use super::{open_manager, RecordView};
use std::path::Path;
use syncstate_core::{OpContext, ResourceType};

/// Runs the show command.
pub fn run(
    path: &Path,
    resource_type: ResourceType,
    key: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = open_manager(path)?;
    let ctx = OpContext::from_config(manager.config());

    let record = manager
        .get(&ctx, resource_type, key)?
        .ok_or_else(|| format!("No {resource_type} record with key {key:?}"))?;
    let view = RecordView::from(&record);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&view)?),
        _ => print_text_output(&view)?,
    }
    Ok(())
}

fn print_text_output(view: &RecordView) -> Result<(), serde_json::Error> {
    println!("Record:      {}", view.name);
    println!("Version:     {}", view.version);
    println!("Type:        {}", view.resource_type);
    println!("Key:         {}", view.key);
    if let Some(account) = &view.account_scope {
        println!("Account:     {account}");
    }
    if let Some(zone) = &view.zone_scope {
        println!("Zone:        {zone}");
    }
    if let Some(credentials) = &view.credentials_ref {
        println!("Credentials: {credentials}");
    }
    println!("Status:      {}", view.sync_status);
    for (k, v) in &view.result_data {
        println!("  {k} = {v}");
    }

    println!();
    println!("Sources ({}):", view.sources.len());
    for source in &view.sources {
        println!(
            "  [{}] {} (updated {})",
            source.priority, source.source, source.last_updated
        );
        println!("      {}", serde_json::to_string(&source.config)?);
    }
    Ok(())
}
