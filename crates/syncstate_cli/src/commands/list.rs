//! List command implementation.

use super::{open_manager, RecordView};
use std::path::Path;
use syncstate_core::{OpContext, ResourceType};

/// Runs the list command.
pub fn run(
    path: &Path,
    resource_type: Option<ResourceType>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let manager = open_manager(path)?;
    let ctx = OpContext::from_config(manager.config());

    let types = match resource_type {
        Some(t) => vec![t],
        None => ResourceType::ALL.to_vec(),
    };

    let mut views = Vec::new();
    for t in types {
        for record in manager.list(&ctx, t)? {
            views.push(RecordView::from(&record));
        }
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&views)?),
        _ => print_text_output(&views),
    }
    Ok(())
}

fn print_text_output(views: &[RecordView]) {
    if views.is_empty() {
        println!("No records");
        return;
    }

    println!(
        "{:<50} {:<22} {:<8} {:>7}",
        "NAME", "TYPE", "STATUS", "SOURCES"
    );
    for view in views {
        println!(
            "{:<50} {:<22} {:<8} {:>7}",
            view.name,
            view.resource_type,
            view.sync_status,
            view.sources.len()
        );
    }
    println!();
    println!("{} record(s)", views.len());
}
