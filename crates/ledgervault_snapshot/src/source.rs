//! The entity source and its file-backed implementation.
//!
//! ## Directory Layout
//!
//! ```text
//! <data>/
//! ├─ STATE                       # {formatVersion, revision}
//! ├─ ledgers/records.cbor
//! ├─ transactions/<ledger>.cbor  # one shard per owning ledger
//! ├─ categories/records.cbor
//! └─ ...                         # one sub-tree per collection
//! ```
//!
//! Every shard is written with write-then-rename, so a reader never sees a
//! partially written shard. The layout is identical to the archive layout,
//! which lets an apply swap extracted sub-trees straight into place.

use crate::codec::cbor::{decode_records, encode_records};
use crate::error::{SnapshotError, SnapshotResult};
use crate::fsutil::{atomic_write, sync_dir};
use crate::model::{Collection, EntitySet, Record, Snapshot};
use parking_lot::{RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the state file inside a data directory.
pub const STATE_FILE: &str = "STATE";
/// Extension of shard files.
const SHARD_EXTENSION: &str = "cbor";

/// Read/write access to the application's persisted collections.
pub trait EntitySource: Send + Sync {
    /// Reads every collection.
    fn read_all(&self) -> SnapshotResult<EntitySet>;

    /// Replaces all records of one collection.
    fn replace_all(&self, collection: Collection, records: &[Record]) -> SnapshotResult<()>;

    /// Returns the schema version of the stored data.
    fn format_version(&self) -> SnapshotResult<u32>;

    /// Returns the time (Unix milliseconds) of the last content change.
    fn revision(&self) -> SnapshotResult<u64>;
}

/// Persisted bookkeeping of a data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataState {
    /// Entity schema version.
    pub format_version: u32,
    /// Time of the last content change (Unix milliseconds).
    pub revision: u64,
}

/// File-backed entity source rooted at a directory.
#[derive(Debug)]
pub struct DataDir {
    root: PathBuf,
    default_format_version: u32,
    /// Writers take it exclusively; whole-directory reads share it.
    lock: RwLock<()>,
}

impl DataDir {
    /// Opens a data directory, creating it if missing.
    ///
    /// `default_format_version` is reported until a `STATE` file exists.
    pub fn open(root: impl Into<PathBuf>, default_format_version: u32) -> SnapshotResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            default_format_version,
            lock: RwLock::new(()),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Returns the sub-tree of a collection.
    #[must_use]
    pub fn collection_dir(&self, collection: Collection) -> PathBuf {
        self.root.join(collection.as_str())
    }

    /// Blocks readers and writers through this handle until the guard is
    /// dropped.
    ///
    /// Held while collections are replaced underneath the directory.
    pub fn lock_exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write()
    }

    /// Loads the state file, falling back to defaults when absent.
    pub fn state(&self) -> SnapshotResult<DataState> {
        let _guard = self.lock.read();
        self.load_state()
    }

    fn load_state(&self) -> SnapshotResult<DataState> {
        let path = self.root.join(STATE_FILE);
        match fs::read(&path) {
            Ok(data) => serde_json::from_slice(&data)
                .map_err(|e| SnapshotError::corrupt(format!("invalid {STATE_FILE} file: {e}"))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(DataState {
                format_version: self.default_format_version,
                revision: 0,
            }),
            Err(err) => Err(err.into()),
        }
    }

    fn save_state(&self, state: &DataState) -> SnapshotResult<()> {
        let data = serde_json::to_vec(state)
            .map_err(|e| SnapshotError::encoding(format!("state encoding failed: {e}")))?;
        atomic_write(&self.root.join(STATE_FILE), &data)?;
        Ok(())
    }

    /// Reads all records of one collection, merging its shards.
    pub fn read_collection(&self, collection: Collection) -> SnapshotResult<Vec<Record>> {
        let dir = self.collection_dir(collection);
        let mut shards = match list_shards(&dir) {
            Ok(shards) => shards,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        shards.sort();

        let mut records = Vec::new();
        for shard in shards {
            let data = fs::read(&shard)?;
            let decoded = decode_records(&data).map_err(|e| {
                SnapshotError::corrupt(format!("{}: {e}", shard.display()))
            })?;
            records.extend(decoded);
        }
        Ok(records)
    }

    fn write_collection(&self, collection: Collection, records: &[Record]) -> SnapshotResult<()> {
        let dir = self.collection_dir(collection);
        fs::create_dir_all(&dir)?;

        let mut set = EntitySet::new();
        set.set(collection, records.to_vec());

        let mut written = BTreeSet::new();
        for (shard, shard_records) in set.shards(collection) {
            let path = dir.join(format!("{shard}.{SHARD_EXTENSION}"));
            atomic_write(&path, &encode_records(&shard_records)?)?;
            written.insert(path);
        }

        for stale in list_shards(&dir)? {
            if !written.contains(&stale) {
                fs::remove_file(&stale)?;
            }
        }
        sync_dir(&dir)?;

        debug!(%collection, records = records.len(), "wrote collection");
        Ok(())
    }

    /// Writes a complete snapshot into this directory.
    ///
    /// The state file takes the snapshot's schema version, and its creation
    /// time becomes the revision.
    pub fn write_snapshot(&self, snapshot: &Snapshot) -> SnapshotResult<()> {
        let _guard = self.lock.write();
        for collection in Collection::ALL {
            self.write_collection(collection, snapshot.entities.get(collection))?;
        }
        self.save_state(&DataState {
            format_version: snapshot.format_version,
            revision: snapshot.created_at,
        })
    }
}

impl EntitySource for DataDir {
    fn read_all(&self) -> SnapshotResult<EntitySet> {
        let _guard = self.lock.read();
        let mut set = EntitySet::new();
        for collection in Collection::ALL {
            set.set(collection, self.read_collection(collection)?);
        }
        Ok(set)
    }

    fn replace_all(&self, collection: Collection, records: &[Record]) -> SnapshotResult<()> {
        let _guard = self.lock.write();
        self.write_collection(collection, records)?;

        let mut state = self.load_state()?;
        state.revision = crate::now_millis().max(state.revision + 1);
        self.save_state(&state)
    }

    fn format_version(&self) -> SnapshotResult<u32> {
        Ok(self.state()?.format_version)
    }

    fn revision(&self) -> SnapshotResult<u64> {
        Ok(self.state()?.revision)
    }
}

/// Lists the shard files of a collection directory.
fn list_shards(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut shards = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_shard = path.is_file()
            && path.extension().is_some_and(|ext| ext == SHARD_EXTENSION)
            && !path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with('.'));
        if is_shard {
            shards.push(path);
        }
    }
    Ok(shards)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn readers_wait_for_exclusive_lock() {
        use std::sync::mpsc;
        use std::time::Duration;

        let dir = tempdir().unwrap();
        let data = DataDir::open(dir.path().join("data"), 1).unwrap();
        data.replace_all(Collection::Ledgers, &[Record::new("L1", json!({}))])
            .unwrap();

        let (tx, rx) = mpsc::channel();
        std::thread::scope(|scope| {
            let exclusive = data.lock_exclusive();
            let reader = &data;
            scope.spawn(move || {
                let count = reader.read_all().unwrap().count(Collection::Ledgers);
                tx.send(count).unwrap();
            });

            assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
            drop(exclusive);
            assert_eq!(rx.recv_timeout(Duration::from_secs(10)).unwrap(), 1);
        });
    }

    #[test]
    fn empty_directory_reads_empty_collections() {
        let dir = tempdir().unwrap();
        let data = DataDir::open(dir.path().join("data"), 7).unwrap();

        let set = data.read_all().unwrap();
        assert_eq!(set.total(), 0);
        assert_eq!(data.format_version().unwrap(), 7);
        assert_eq!(data.revision().unwrap(), 0);
    }

    #[test]
    fn replace_all_round_trip() {
        let dir = tempdir().unwrap();
        let data = DataDir::open(dir.path(), 1).unwrap();

        let records = vec![
            Record::owned("t1", "L1", json!({"amount": 1})),
            Record::owned("t2", "L2", json!({"amount": 2})),
        ];
        data.replace_all(Collection::Transactions, &records).unwrap();

        assert!(data.collection_dir(Collection::Transactions).join("L1.cbor").exists());
        assert!(data.collection_dir(Collection::Transactions).join("L2.cbor").exists());
        assert_eq!(data.read_collection(Collection::Transactions).unwrap(), records);
        assert!(data.revision().unwrap() > 0);
    }

    #[test]
    fn replace_all_removes_stale_shards() {
        let dir = tempdir().unwrap();
        let data = DataDir::open(dir.path(), 1).unwrap();

        data.replace_all(
            Collection::Transactions,
            &[Record::owned("t1", "L1", json!(1)), Record::owned("t2", "L2", json!(2))],
        )
        .unwrap();
        data.replace_all(Collection::Transactions, &[Record::owned("t1", "L1", json!(1))])
            .unwrap();

        let tx_dir = data.collection_dir(Collection::Transactions);
        assert!(tx_dir.join("L1.cbor").exists());
        assert!(!tx_dir.join("L2.cbor").exists());
    }

    #[test]
    fn revision_is_monotonic() {
        let dir = tempdir().unwrap();
        let data = DataDir::open(dir.path(), 1).unwrap();

        data.replace_all(Collection::Ledgers, &[]).unwrap();
        let first = data.revision().unwrap();
        data.replace_all(Collection::Ledgers, &[]).unwrap();
        assert!(data.revision().unwrap() > first);
    }

    #[test]
    fn write_snapshot_sets_state() {
        let dir = tempdir().unwrap();
        let data = DataDir::open(dir.path(), 1).unwrap();
        let entities = EntitySet::new().with(Collection::Ledgers, Record::new("L1", json!({})));

        data.write_snapshot(&Snapshot::new(5, 1234, "d", entities.clone()))
            .unwrap();

        assert_eq!(data.state().unwrap(), DataState { format_version: 5, revision: 1234 });
        assert_eq!(data.read_all().unwrap(), entities);
    }

    #[test]
    fn corrupt_shard_is_reported() {
        let dir = tempdir().unwrap();
        let data = DataDir::open(dir.path(), 1).unwrap();
        let ledgers = data.collection_dir(Collection::Ledgers);
        fs::create_dir_all(&ledgers).unwrap();
        fs::write(ledgers.join("records.cbor"), [0xff, 0xff]).unwrap();

        let err = data.read_all().unwrap_err();
        assert!(err.is_corrupt());
    }
}
