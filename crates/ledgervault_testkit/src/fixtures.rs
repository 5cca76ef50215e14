//! Sample data and engine fixtures.
//!
//! Provides ready-made data sets and a sync engine bound to a temporary
//! directory, an in-memory WebDAV server and fault-injecting tree ops.

use crate::dav::{MemoryDav, ENDPOINT};
use crate::faults::FailingTreeOps;
use ledgervault_snapshot::{Collection, DataDir, EntitySet, EntitySource, Record};
use ledgervault_sync::{EngineConfig, RemoteSyncDescriptor, SyncOrchestrator};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Username configured by [`TestEngine::with_dav`].
pub const USERNAME: &str = "alice";
/// Secret configured by [`TestEngine::with_dav`].
pub const SECRET: &str = "app-password";

/// A small but complete data set touching every collection.
pub fn sample_entities() -> EntitySet {
    let mut set = EntitySet::new()
        .with(Collection::Ledgers, Record::new("L1", json!({"name": "Household", "currency": "EUR"})))
        .with(Collection::Ledgers, Record::new("L2", json!({"name": "Travel", "currency": "USD"})))
        .with(Collection::Categories, Record::new("C1", json!({"name": "Groceries"})))
        .with(Collection::Budgets, Record::new("B1", json!({"category": "C1", "limit": 400})))
        .with(Collection::SavingsPlans, Record::new("S1", json!({"target": 5000})))
        .with(Collection::Accounts, Record::new("A1", json!({"name": "Checking"})))
        .with(Collection::Currencies, Record::new("EUR", json!({"symbol": "€"})))
        .with(Collection::Settings, Record::new("theme", json!("dark")));
    for (i, ledger) in ["L1", "L1", "L1", "L2", "L2"].iter().enumerate() {
        set.push(
            Collection::Transactions,
            Record::owned(
                format!("T{i}"),
                *ledger,
                json!({"amountCents": -1250 * (i as i64 + 1), "category": "C1"}),
            ),
        );
    }
    set
}

/// A data set disjoint from [`sample_entities`].
pub fn alternate_entities() -> EntitySet {
    EntitySet::new()
        .with(Collection::Ledgers, Record::new("L9", json!({"name": "Business", "currency": "GBP"})))
        .with(
            Collection::Transactions,
            Record::owned("T9", "L9", json!({"amount": 1000, "category": null})),
        )
        .with(Collection::Settings, Record::new("theme", json!("light")))
}

/// Replaces every collection of `data` with the content of `entities`.
pub fn populate(data: &DataDir, entities: &EntitySet) {
    for collection in Collection::ALL {
        data.replace_all(collection, entities.get(collection))
            .expect("Failed to populate data directory");
    }
}

/// The remote descriptor pointing at a [`MemoryDav`].
pub fn memory_descriptor() -> RemoteSyncDescriptor {
    RemoteSyncDescriptor::new(ENDPOINT, USERNAME, SECRET)
}

/// A sync engine in a temporary directory with automatic cleanup.
pub struct TestEngine {
    /// The engine instance.
    pub engine: SyncOrchestrator,
    /// The tree ops the engine applies snapshots with.
    pub ops: Arc<FailingTreeOps>,
    dav: MemoryDav,
    dir: TempDir,
}

impl TestEngine {
    /// Creates an engine talking to `dav`, with the remote already configured.
    pub fn with_dav(dav: &MemoryDav) -> Self {
        let engine = Self::unconfigured(dav);
        engine
            .engine
            .configure_remote(memory_descriptor())
            .expect("Failed to configure remote");
        engine
    }

    /// Creates an engine talking to `dav` without a remote descriptor.
    pub fn unconfigured(dav: &MemoryDav) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let ops = Arc::new(FailingTreeOps::new());
        let engine = open_engine(dir.path(), dav, Arc::clone(&ops));
        Self {
            engine,
            ops,
            dav: dav.clone(),
            dir,
        }
    }

    /// Returns the engine root directory.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Drops the engine and opens a fresh one on the same directory.
    ///
    /// Simulates an application restart, including crash recovery.
    pub fn restart(self) -> Self {
        let Self { engine, dav, dir, .. } = self;
        drop(engine);
        let ops = Arc::new(FailingTreeOps::new());
        let engine = open_engine(dir.path(), &dav, Arc::clone(&ops));
        Self { engine, ops, dav, dir }
    }
}

impl std::ops::Deref for TestEngine {
    type Target = SyncOrchestrator;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// Opens an engine rooted at `root`.
pub fn open_engine(root: &Path, dav: &MemoryDav, ops: Arc<FailingTreeOps>) -> SyncOrchestrator {
    SyncOrchestrator::with_parts(EngineConfig::new(root), Arc::new(dav.clone()), ops)
        .expect("Failed to open sync engine")
}
