//! Local snapshot commands.

use super::{format_timestamp, print_report, ExportKind, OutputFormat};
use ledgervault_snapshot::SnapshotMetadata;
use ledgervault_sync::SyncOrchestrator;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tracing::info;

fn metadata_json(meta: &SnapshotMetadata) -> Value {
    json!({
        "name": meta.name,
        "createdAt": meta.created_at,
        "size": meta.size,
        "ledgerCount": meta.ledger_count,
        "transactionCount": meta.transaction_count,
        "originDeviceId": meta.origin_device_id,
        "degraded": meta.degraded,
    })
}

fn print_metadata(meta: &SnapshotMetadata) {
    let marker = if meta.degraded { " (unreadable)" } else { "" };
    println!("{}{marker}", meta.name);
    println!("  Created: {}", format_timestamp(meta.created_at));
    println!("  Size: {} bytes", meta.size);
    println!("  Ledgers: {}", meta.ledger_count);
    println!("  Transactions: {}", meta.transaction_count);
    if let Some(device) = &meta.origin_device_id {
        println!("  Device: {device}");
    }
}

/// Capture the current state into the local store.
pub fn create(engine: &SyncOrchestrator, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let meta = engine.create_local_snapshot()?;
    match format {
        OutputFormat::Json => println!("{}", metadata_json(&meta)),
        OutputFormat::Text => {
            println!("✓ Snapshot created");
            print_metadata(&meta);
        }
    }
    Ok(())
}

/// List local snapshots, newest first.
pub fn list(engine: &SyncOrchestrator, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let snapshots = engine.list_local_snapshots();
    match format {
        OutputFormat::Json => {
            let entries: Vec<Value> = snapshots.iter().map(metadata_json).collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Text if snapshots.is_empty() => println!("No snapshots"),
        OutputFormat::Text => {
            for meta in &snapshots {
                print_metadata(meta);
            }
        }
    }
    Ok(())
}

/// Delete a local snapshot.
pub fn delete(engine: &SyncOrchestrator, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    if engine.delete_local_snapshot(name)? {
        println!("✓ Deleted {name}");
    } else {
        println!("No snapshot named {name}");
    }
    Ok(())
}

/// Replace the live data with a local snapshot.
pub fn restore(
    engine: &SyncOrchestrator,
    name: &str,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Restoring snapshot {}", name);
    let report = engine.restore_from_local_snapshot(name)?;
    print_report("Snapshot restored", &report, format);
    Ok(())
}

/// Copy a snapshot out of the store.
pub fn export(
    engine: &SyncOrchestrator,
    name: &str,
    dest: &Path,
    kind: ExportKind,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = engine.export_snapshot(name, dest, kind.into())?;
    println!("✓ Exported to {}", path.display());
    Ok(())
}

/// Validate a snapshot file and add it to the store.
pub fn import(
    engine: &SyncOrchestrator,
    file: &Path,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Importing snapshot from {:?}", file);
    let bytes = fs::read(file)?;
    let meta = engine.import_snapshot(&bytes)?;
    match format {
        OutputFormat::Json => println!("{}", metadata_json(&meta)),
        OutputFormat::Text => {
            println!("✓ Snapshot imported");
            print_metadata(&meta);
        }
    }
    Ok(())
}
