//! CLI command implementations.

pub mod remote;
pub mod snapshot;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use ledgervault_snapshot::SnapshotFormat;
use ledgervault_sync::SyncReport;
use serde_json::{json, Value};

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines
    Text,
    /// One JSON document
    Json,
}

/// Format of an exported snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportKind {
    /// Packed archive
    Archive,
    /// JSON document
    Document,
}

impl From<ExportKind> for SnapshotFormat {
    fn from(kind: ExportKind) -> Self {
        match kind {
            ExportKind::Archive => SnapshotFormat::Archive,
            ExportKind::Document => SnapshotFormat::Document,
        }
    }
}

/// Renders Unix milliseconds as an RFC 3339 UTC timestamp.
pub fn format_timestamp(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
        .unwrap_or_else(|| format!("{ms} ms since epoch"))
}

fn report_json(report: &SyncReport) -> Value {
    json!({
        "bytes": report.bytes,
        "ledgerCount": report.ledger_count,
        "transactionCount": report.transaction_count,
        "snapshotTime": report.snapshot_time,
        "completedAt": report.completed_at,
    })
}

/// Prints the outcome of a push, pull or restore.
pub fn print_report(title: &str, report: &SyncReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", report_json(report)),
        OutputFormat::Text => {
            println!("✓ {title}");
            println!("  Size: {} bytes", report.bytes);
            println!("  Ledgers: {}", report.ledger_count);
            println!("  Transactions: {}", report.transaction_count);
            println!("  Snapshot time: {}", format_timestamp(report.snapshot_time));
        }
    }
}
