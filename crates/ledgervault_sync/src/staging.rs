//! Crash-safe application of a snapshot to the live data directory.
//!
//! ## Protocol
//!
//! ```text
//! <root>/.staging/
//! ├─ APPLY              journal: {id, phase, startedAt}
//! └─ <id>/
//!    ├─ rollback/       full copy of the data directory before the apply
//!    └─ extract/        the snapshot, laid out like the data directory
//! ```
//!
//! 1. **backing-up**: copy the data directory to `rollback/`, then write the
//!    snapshot into `extract/` and verify it. Live data is untouched.
//! 2. **applying**: per collection, `extract/<c>` moves to `<data>/.<c>.incoming`,
//!    the live tree moves to `<data>/.<c>.retired`, and the incoming tree
//!    takes the live name. No live tree is removed before its replacement
//!    is on disk. The state file is swapped last.
//! 3. **swapped**: retired trees and staging are removed.
//!
//! If anything fails during phase 2 the whole data directory is restored
//! from `rollback/`. A crash is resolved by [`Stager::recover`] on the next
//! start: phase 1 discards staging, phase 2 restores, phase 3 cleans up.
//! A journal left by a failed rollback is resolved the same way before the
//! next apply begins, so its rollback copy is never discarded unused.

use crate::error::{SyncError, SyncResult};
use ledgervault_snapshot::fsutil::{atomic_write, sync_dir};
use ledgervault_snapshot::{
    now_millis, Collection, DataDir, EntitySource, Snapshot, STATE_FILE,
};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// Name of the journal file inside the staging directory.
pub const JOURNAL_FILE: &str = "APPLY";
const ROLLBACK_DIR: &str = "rollback";
const EXTRACT_DIR: &str = "extract";

/// File-system operations used while staging and swapping.
///
/// Abstracted so tests can inject failures at precise points.
pub trait TreeOps: Send + Sync {
    /// Recursively copies the directory `from` to `to`.
    fn copy_tree(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Atomically renames `from` to `to`.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Removes a file or directory tree. A missing path is not an error.
    fn remove_tree(&self, path: &Path) -> io::Result<()>;

    /// Creates a directory and all of its parents.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// [`TreeOps`] on the real file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdTreeOps;

impl TreeOps for StdTreeOps {
    fn copy_tree(&self, from: &Path, to: &Path) -> io::Result<()> {
        for entry in WalkDir::new(from).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            let relative = entry
                .path()
                .strip_prefix(from)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            let target = to.join(relative);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)?;
            } else if entry.file_type().is_file() {
                fs::copy(entry.path(), &target)?;
                File::open(&target)?.sync_all()?;
            }
        }
        sync_dir(to)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_tree(&self, path: &Path) -> io::Result<()> {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }
}

/// Progress recorded in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplyPhase {
    /// Rollback copy and extraction; live data untouched.
    BackingUp,
    /// Live trees are being replaced.
    Applying,
    /// Every tree was replaced; only cleanup remains.
    Swapped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyJournal {
    id: String,
    phase: ApplyPhase,
    started_at: u64,
}

/// What [`Stager::recover`] found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// No interrupted apply.
    Clean,
    /// An apply was interrupted before touching live data; staging discarded.
    DiscardedStaging,
    /// An apply was interrupted mid-swap; live data restored.
    RolledBack,
    /// An apply had finished swapping; leftovers removed.
    Completed,
}

/// Runs the stage / verify / swap / rollback protocol.
pub struct Stager {
    data_dir: PathBuf,
    staging_dir: PathBuf,
    ops: Arc<dyn TreeOps>,
}

impl Stager {
    /// Creates a stager for `data_dir` using `staging_dir` as scratch space.
    pub fn new(
        data_dir: impl Into<PathBuf>,
        staging_dir: impl Into<PathBuf>,
        ops: Arc<dyn TreeOps>,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            staging_dir: staging_dir.into(),
            ops,
        }
    }

    /// Returns the staging directory.
    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Takes the rollback copy and returns the staged apply.
    ///
    /// A pending journal is recovered first; if that fails the apply is
    /// refused. Otherwise fails without side effects on the data directory.
    pub fn begin(&self) -> SyncResult<StagedApply<'_>> {
        if let Some(pending) = self.read_journal()? {
            warn!(
                id = %pending.id,
                phase = ?pending.phase,
                "resolving pending apply before a new one"
            );
            self.recover()?;
        }

        self.ops
            .create_dir_all(&self.staging_dir)
            .map_err(|e| SyncError::staging_io(self.staging_dir.display(), &e))?;

        let id = Uuid::new_v4().to_string();
        let staged = StagedApply {
            stager: self,
            dir: self.staging_dir.join(&id),
            journal: ApplyJournal {
                id,
                phase: ApplyPhase::BackingUp,
                started_at: now_millis(),
            },
        };
        self.write_journal(&staged.journal)?;

        let rollback = staged.dir.join(ROLLBACK_DIR);
        if let Err(e) = self.ops.copy_tree(&self.data_dir, &rollback) {
            let err = SyncError::staging_io("backing up data directory", &e);
            staged.discard();
            return Err(err);
        }

        debug!(id = %staged.journal.id, "rollback copy taken");
        Ok(staged)
    }

    /// Resolves an apply interrupted by a crash.
    pub fn recover(&self) -> SyncResult<RecoveryOutcome> {
        let outcome = match self.read_journal()? {
            None => {
                self.remove_orphans()?;
                RecoveryOutcome::Clean
            }
            Some(journal) => {
                let dir = self.staging_dir.join(&journal.id);
                let outcome = match journal.phase {
                    ApplyPhase::BackingUp => RecoveryOutcome::DiscardedStaging,
                    ApplyPhase::Applying => {
                        self.restore(&dir.join(ROLLBACK_DIR))?;
                        RecoveryOutcome::RolledBack
                    }
                    ApplyPhase::Swapped => RecoveryOutcome::Completed,
                };
                self.remove_leftovers()?;
                self.remove_staging(&journal.id)?;
                self.remove_orphans()?;
                outcome
            }
        };

        if outcome != RecoveryOutcome::Clean {
            warn!(?outcome, "recovered interrupted apply");
        }
        Ok(outcome)
    }

    fn restore(&self, rollback: &Path) -> SyncResult<()> {
        if !rollback.is_dir() {
            return Err(SyncError::staging(format!(
                "rollback copy missing at {}",
                rollback.display()
            )));
        }
        self.ops
            .remove_tree(&self.data_dir)
            .map_err(|e| SyncError::staging_io("clearing data directory", &e))?;
        self.ops
            .copy_tree(rollback, &self.data_dir)
            .map_err(|e| SyncError::staging_io("restoring data directory", &e))?;
        info!(data = %self.data_dir.display(), "data directory restored from rollback copy");
        Ok(())
    }

    /// Removes `.incoming` and `.retired` trees left in the data directory.
    fn remove_leftovers(&self) -> SyncResult<()> {
        for collection in Collection::ALL {
            for path in [
                incoming_path(&self.data_dir, collection),
                retired_path(&self.data_dir, collection),
            ] {
                self.ops
                    .remove_tree(&path)
                    .map_err(|e| SyncError::staging_io(path.display(), &e))?;
            }
        }
        Ok(())
    }

    /// Removes staging sub-directories that no journal refers to.
    fn remove_orphans(&self) -> SyncResult<()> {
        let entries = match fs::read_dir(&self.staging_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(SyncError::staging_io(self.staging_dir.display(), &err)),
        };
        for entry in entries {
            let path = entry
                .map_err(|e| SyncError::staging_io(self.staging_dir.display(), &e))?
                .path();
            if path.is_dir() {
                debug!(path = %path.display(), "removing orphaned staging directory");
                self.ops
                    .remove_tree(&path)
                    .map_err(|e| SyncError::staging_io(path.display(), &e))?;
            }
        }
        self.remove_leftovers()
    }

    /// Removes the staging directory of apply `id`, then its journal.
    ///
    /// A journal written by another apply is left in place.
    fn remove_staging(&self, id: &str) -> SyncResult<()> {
        let dir = self.staging_dir.join(id);
        self.ops
            .remove_tree(&dir)
            .map_err(|e| SyncError::staging_io(dir.display(), &e))?;

        if let Ok(Some(journal)) = self.read_journal() {
            if journal.id != id {
                warn!(id, owner = %journal.id, "journal belongs to another apply; kept");
                return Ok(());
            }
        }
        let journal = self.staging_dir.join(JOURNAL_FILE);
        self.ops
            .remove_tree(&journal)
            .map_err(|e| SyncError::staging_io(journal.display(), &e))
    }

    fn write_journal(&self, journal: &ApplyJournal) -> SyncResult<()> {
        let data = serde_json::to_vec(journal)
            .map_err(|e| SyncError::staging(format!("journal encoding failed: {e}")))?;
        let path = self.staging_dir.join(JOURNAL_FILE);
        atomic_write(&path, &data).map_err(|e| SyncError::staging_io(path.display(), &e))
    }

    fn read_journal(&self) -> SyncResult<Option<ApplyJournal>> {
        let path = self.staging_dir.join(JOURNAL_FILE);
        match fs::read(&path) {
            Ok(data) => serde_json::from_slice(&data)
                .map(Some)
                .map_err(|e| SyncError::staging(format!("unreadable apply journal: {e}"))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(SyncError::staging_io(path.display(), &err)),
        }
    }
}

/// An apply whose rollback copy has been taken.
pub struct StagedApply<'a> {
    stager: &'a Stager,
    dir: PathBuf,
    journal: ApplyJournal,
}

impl StagedApply<'_> {
    /// Returns the staging directory of this apply.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `snapshot` into the extraction directory and verifies it.
    pub fn extract(&self, snapshot: &Snapshot) -> SyncResult<()> {
        let target = DataDir::open(self.dir.join(EXTRACT_DIR), snapshot.format_version)?;
        target.write_snapshot(snapshot)?;

        let extracted = target.read_all()?.counts();
        let expected = snapshot.entities.counts();
        if extracted != expected {
            return Err(SyncError::staging(format!(
                "extracted data does not match snapshot: {extracted:?} != {expected:?}"
            )));
        }
        debug!(records = snapshot.entities.total(), "snapshot extracted");
        Ok(())
    }

    /// Replaces every live collection with its extracted counterpart.
    ///
    /// On error, live data may be partially swapped; call
    /// [`rollback`](Self::rollback).
    pub fn swap(&mut self) -> SyncResult<()> {
        self.set_phase(ApplyPhase::Applying)?;

        let ops = &self.stager.ops;
        let data = &self.stager.data_dir;
        let extract = self.dir.join(EXTRACT_DIR);

        for collection in Collection::ALL {
            let source = extract.join(collection.as_str());
            let live = data.join(collection.as_str());
            let incoming = incoming_path(data, collection);
            let retired = retired_path(data, collection);
            let io_err = |e: io::Error| SyncError::staging_io(format!("swapping {collection}"), &e);

            ops.remove_tree(&incoming).map_err(io_err)?;
            ops.remove_tree(&retired).map_err(io_err)?;
            ops.rename(&source, &incoming).map_err(io_err)?;
            if live.exists() {
                ops.rename(&live, &retired).map_err(io_err)?;
            }
            ops.rename(&incoming, &live).map_err(io_err)?;
            debug!(%collection, "collection swapped");
        }

        ops.rename(&extract.join(STATE_FILE), &data.join(STATE_FILE))
            .map_err(|e| SyncError::staging_io("swapping state file", &e))?;
        sync_dir(data).map_err(|e| SyncError::staging_io(data.display(), &e))?;

        self.set_phase(ApplyPhase::Swapped)
    }

    /// Restores the data directory from the rollback copy and removes staging.
    pub fn rollback(self) -> SyncResult<()> {
        warn!(id = %self.journal.id, "rolling back apply");
        self.stager.restore(&self.dir.join(ROLLBACK_DIR))?;
        self.stager.remove_leftovers()?;
        self.stager.remove_staging(&self.journal.id)
    }

    /// Removes retired trees and staging after a successful swap.
    ///
    /// Live data is already in its final state, so failures are only logged.
    pub fn commit(self) {
        let cleanup = self
            .stager
            .remove_leftovers()
            .and_then(|()| self.stager.remove_staging(&self.journal.id));
        if let Err(err) = cleanup {
            warn!(error = %err, "cleanup after apply failed; next start will finish it");
        }
    }

    /// Abandons the apply before any live data was touched.
    pub fn discard(self) {
        if let Err(err) = self.stager.remove_staging(&self.journal.id) {
            error!(error = %err, "failed to discard staging directory");
        }
    }

    fn set_phase(&mut self, phase: ApplyPhase) -> SyncResult<()> {
        self.journal.phase = phase;
        self.stager.write_journal(&self.journal)
    }
}

fn incoming_path(data: &Path, collection: Collection) -> PathBuf {
    data.join(format!(".{}.incoming", collection.as_str()))
}

fn retired_path(data: &Path, collection: Collection) -> PathBuf {
    data.join(format!(".{}.retired", collection.as_str()))
}
