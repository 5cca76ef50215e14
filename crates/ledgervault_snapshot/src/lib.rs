//! # LedgerVault Snapshot
//!
//! Point-in-time snapshots of LedgerVault application data.
//!
//! This crate provides:
//! - The entity data model (collections of JSON records)
//! - A file-backed entity source with crash-safe writes
//! - The snapshot codec (packed archive and JSON document formats)
//! - A local snapshot store with count-based retention
//! - Persistent per-installation device identity
//!
//! ## Key Invariants
//!
//! - A snapshot always contains every collection, even empty ones
//! - Decoding either returns a complete snapshot or fails
//! - Identical state encodes to identical archive bytes
//! - Store files are visible only after they are fully written

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
mod error;
pub mod fsutil;
mod identity;
mod model;
mod source;
mod store;

pub use codec::{decode, fingerprint, SnapshotCodec, SnapshotFormat, SnapshotSummary};
pub use error::{SnapshotError, SnapshotResult};
pub use identity::DeviceIdentity;
pub use model::{is_valid_shard_name, Collection, EntitySet, Record, Snapshot, DEFAULT_SHARD};
pub use source::{DataDir, DataState, EntitySource, STATE_FILE};
pub use store::{
    parse_snapshot_name, snapshot_name, RetentionPolicy, SnapshotMetadata, SnapshotStore,
};

/// Current time as Unix milliseconds.
#[must_use]
pub fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
