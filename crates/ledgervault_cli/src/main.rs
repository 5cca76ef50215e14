//! LedgerVault CLI
//!
//! Command-line access to LedgerVault backups and remote sync.
//!
//! # Commands
//!
//! - `snapshot` - Create, list, delete, restore, export and import local snapshots
//! - `remote` - Configure the WebDAV remote, test it, push and pull
//! - `fingerprint` - Print the content fingerprint of the live data

mod commands;

use clap::{Parser, Subcommand};
use commands::{ExportKind, OutputFormat};
use ledgervault_sync::{EngineConfig, SyncOrchestrator};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// LedgerVault backup and sync tools.
#[derive(Parser)]
#[command(name = "ledgervault")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Application data root
    #[arg(global = true, short, long, default_value = ".")]
    root: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Number of local snapshots kept after each creation
    #[arg(global = true, long)]
    keep: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage local snapshots
    Snapshot {
        #[command(subcommand)]
        action: SnapshotCommand,
    },

    /// Manage the remote and synchronize with it
    Remote {
        #[command(subcommand)]
        action: RemoteCommand,
    },

    /// Print the content fingerprint of the live data
    Fingerprint,

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum SnapshotCommand {
    /// Capture the current state
    Create,

    /// List snapshots, newest first
    List,

    /// Delete a snapshot
    Delete {
        /// Snapshot file name
        name: String,
    },

    /// Replace the live data with a snapshot
    Restore {
        /// Snapshot file name
        name: String,
    },

    /// Copy a snapshot out of the store
    Export {
        /// Snapshot file name
        name: String,

        /// Destination directory
        #[arg(short, long)]
        dest: PathBuf,

        /// Exported format
        #[arg(long = "as", value_enum, default_value_t = ExportKind::Archive)]
        kind: ExportKind,
    },

    /// Validate a snapshot file and add it to the store
    Import {
        /// Snapshot file (archive or JSON document)
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum RemoteCommand {
    /// Store the remote connection settings
    Configure {
        /// WebDAV endpoint URL
        #[arg(short, long)]
        endpoint: String,

        /// Basic Auth user name
        #[arg(short, long)]
        username: String,

        /// Password or app token (defaults to $LEDGERVAULT_SECRET)
        #[arg(short, long)]
        secret: Option<String>,

        /// Store the settings with remote sync switched off
        #[arg(long)]
        disabled: bool,
    },

    /// Check the stored settings against the remote
    Test,

    /// Show the metadata of the remote snapshot
    Info,

    /// Upload the current state
    Push,

    /// Replace the live data with the remote snapshot
    Pull,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so JSON output stays parseable.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("LedgerVault CLI v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut config = EngineConfig::new(cli.root.clone());
    if let Some(keep) = cli.keep {
        config = config.with_keep_count(keep);
    }
    let engine = SyncOrchestrator::open(config)?;
    let format = cli.format;

    match cli.command {
        Commands::Snapshot { action } => match action {
            SnapshotCommand::Create => commands::snapshot::create(&engine, format)?,
            SnapshotCommand::List => commands::snapshot::list(&engine, format)?,
            SnapshotCommand::Delete { name } => commands::snapshot::delete(&engine, &name)?,
            SnapshotCommand::Restore { name } => {
                commands::snapshot::restore(&engine, &name, format)?;
            }
            SnapshotCommand::Export { name, dest, kind } => {
                commands::snapshot::export(&engine, &name, &dest, kind)?;
            }
            SnapshotCommand::Import { file } => {
                commands::snapshot::import(&engine, &file, format)?;
            }
        },
        Commands::Remote { action } => match action {
            RemoteCommand::Configure {
                endpoint,
                username,
                secret,
                disabled,
            } => {
                let secret = match secret {
                    Some(secret) => secret,
                    None => std::env::var("LEDGERVAULT_SECRET")
                        .map_err(|_| "secret required: pass --secret or set LEDGERVAULT_SECRET")?,
                };
                commands::remote::configure(&engine, endpoint, username, secret, !disabled)?;
            }
            RemoteCommand::Test => commands::remote::test(&engine)?,
            RemoteCommand::Info => commands::remote::info(&engine, format)?,
            RemoteCommand::Push => commands::remote::push(&engine, format)?,
            RemoteCommand::Pull => commands::remote::pull(&engine, format)?,
        },
        Commands::Fingerprint => {
            let fingerprint = engine.fingerprint()?;
            match format {
                OutputFormat::Text => println!("{fingerprint}"),
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({ "fingerprint": fingerprint }));
                }
            }
        }
        Commands::Version => {}
    }

    Ok(())
}
