//! # LedgerVault Sync
//!
//! Backup and remote synchronization for LedgerVault.
//!
//! This crate provides:
//! - Push of the current state to a WebDAV remote, with a sidecar metadata file
//! - Pull of the remote snapshot with an all-or-nothing local apply
//! - Restore from, and management of, local snapshots
//! - A single-flight status machine with cancellation
//! - Crash recovery of an interrupted apply
//! - An async facade for callers running on tokio
//!
//! ## Key Invariants
//!
//! - At most one push, pull or restore runs at a time
//! - After any apply, live data equals either the pre-apply state or the
//!   snapshot's state, never a mixture
//! - A pull that finds nothing remotely leaves local data untouched
//! - Credentials never appear in logs or error messages
//! - Conflicts resolve by last writer wins: a pull replaces local state

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod meta;
mod orchestrator;
mod service;
mod staging;
mod state;

pub use config::{DescriptorFile, EngineConfig, RemoteSyncDescriptor};
pub use error::{ErrorKind, SyncError, SyncResult};
pub use meta::RemoteSyncMeta;
pub use orchestrator::{SyncOrchestrator, SyncReport};
pub use service::SyncService;
pub use staging::{
    ApplyPhase, RecoveryOutcome, StagedApply, Stager, StdTreeOps, TreeOps, JOURNAL_FILE,
};
pub use state::{OperationGuard, StatusCell, SyncStatus};
