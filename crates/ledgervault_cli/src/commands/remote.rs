//! Remote configuration and sync commands.

use super::{format_timestamp, print_report, OutputFormat};
use ledgervault_sync::{RemoteSyncDescriptor, SyncOrchestrator};
use serde_json::json;

/// Store the remote connection settings.
pub fn configure(
    engine: &SyncOrchestrator,
    endpoint: String,
    username: String,
    secret: String,
    enabled: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut descriptor = RemoteSyncDescriptor::new(endpoint, username, secret);
    descriptor.enabled = enabled;
    if enabled {
        descriptor.validate()?;
    }
    engine.configure_remote(descriptor)?;
    println!("✓ Remote configured{}", if enabled { "" } else { " (disabled)" });
    Ok(())
}

/// Check the stored settings against the remote.
pub fn test(engine: &SyncOrchestrator) -> Result<(), Box<dyn std::error::Error>> {
    let descriptor = engine
        .remote_descriptor()?
        .ok_or("remote is not configured")?;
    engine.test_remote_connection(&descriptor)?;
    println!("✓ Connected to {}", descriptor.endpoint_url);
    Ok(())
}

/// Show the metadata of the remote snapshot.
pub fn info(engine: &SyncOrchestrator, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let meta = engine.get_remote_sync_info()?;
    match (format, meta) {
        (OutputFormat::Json, meta) => println!("{}", json!({ "remote": meta })),
        (OutputFormat::Text, None) => println!("No remote snapshot"),
        (OutputFormat::Text, Some(meta)) => {
            println!("Remote snapshot");
            println!("  Uploaded: {}", format_timestamp(meta.last_sync_time));
            println!("  Device: {}", meta.device_id);
            println!("  Version: {}", meta.version);
        }
    }
    Ok(())
}

/// Upload the current state.
pub fn push(engine: &SyncOrchestrator, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let report = engine.push()?;
    print_report("Pushed to remote", &report, format);
    Ok(())
}

/// Replace the live data with the remote snapshot.
pub fn pull(engine: &SyncOrchestrator, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let report = engine.pull()?;
    print_report("Pulled from remote", &report, format);
    Ok(())
}
