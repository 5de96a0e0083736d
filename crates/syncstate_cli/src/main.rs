//! SyncState CLI
//!
//! Command-line tools for inspecting and repairing a directory-backed
//! SyncState store.
//!
//! # Commands
//!
//! - `list` - List state records, optionally of one resource type
//! - `show` - Display one record with its decoded contributions
//! - `remove-source` - Withdraw a producer's contribution
//! - `migrate` - Move a placeholder record to its external ID
//! - `set-status` - Record a sync result on a record
//! - `verify` - Check every record decodes and has sources

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use syncstate_core::{ResourceType, SyncStatus};
use tracing_subscriber::EnvFilter;

/// SyncState command-line store tools.
#[derive(Parser)]
#[command(name = "syncstate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List state records
    List {
        /// Only records of this resource type (e.g. Tunnel, DNSRecord)
        #[arg(short = 't', long = "type", value_parser = parse_resource_type)]
        resource_type: Option<ResourceType>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Display one record
    Show {
        /// Resource type
        #[arg(value_parser = parse_resource_type)]
        resource_type: ResourceType,

        /// Record key (external ID or pending-<producer>)
        key: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Withdraw a producer's contribution from a record
    RemoveSource {
        /// Resource type
        #[arg(value_parser = parse_resource_type)]
        resource_type: ResourceType,

        /// Record key
        key: String,

        /// Source identity, Kind/Name or Kind/Namespace/Name
        source: String,
    },

    /// Move a producer's placeholder record to its external ID
    Migrate {
        /// Resource type
        #[arg(value_parser = parse_resource_type)]
        resource_type: ResourceType,

        /// Producer name the placeholder was created for
        producer: String,

        /// External ID to migrate to
        new_key: String,
    },

    /// Record a sync result on a record
    SetStatus {
        /// Resource type
        #[arg(value_parser = parse_resource_type)]
        resource_type: ResourceType,

        /// Record key
        key: String,

        /// New status
        #[arg(value_enum)]
        status: StatusArg,

        /// Result data entries as key=value
        #[arg(short, long = "data")]
        data: Vec<String>,
    },

    /// Verify store integrity
    Verify {
        /// Delete records that have no sources
        #[arg(long)]
        fix: bool,
    },

    /// Show version information
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Pending,
    Synced,
    Error,
}

impl From<StatusArg> for SyncStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Pending => SyncStatus::Pending,
            StatusArg::Synced => SyncStatus::Synced,
            StatusArg::Error => SyncStatus::Error,
        }
    }
}

fn parse_resource_type(s: &str) -> Result<ResourceType, String> {
    s.parse().map_err(|e: syncstate_core::CoreError| e.to_string())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::List {
            resource_type,
            format,
        } => {
            let path = cli.path.ok_or("Store path required for list")?;
            commands::list::run(&path, resource_type, &format)?;
        }
        Commands::Show {
            resource_type,
            key,
            format,
        } => {
            let path = cli.path.ok_or("Store path required for show")?;
            commands::show::run(&path, resource_type, &key, &format)?;
        }
        Commands::RemoveSource {
            resource_type,
            key,
            source,
        } => {
            let path = cli.path.ok_or("Store path required for remove-source")?;
            commands::edit::remove_source(&path, resource_type, &key, &source)?;
        }
        Commands::Migrate {
            resource_type,
            producer,
            new_key,
        } => {
            let path = cli.path.ok_or("Store path required for migrate")?;
            commands::edit::migrate(&path, resource_type, &producer, &new_key)?;
        }
        Commands::SetStatus {
            resource_type,
            key,
            status,
            data,
        } => {
            let path = cli.path.ok_or("Store path required for set-status")?;
            commands::edit::set_status(&path, resource_type, &key, status.into(), &data)?;
        }
        Commands::Verify { fix } => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path, fix)?;
        }
        Commands::Version => {
            println!("SyncState CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("SyncState Core v{}", syncstate_core::VERSION);
        }
    }

    Ok(())
}
