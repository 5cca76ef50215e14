//! Local snapshot store.
//!
//! Snapshots live as archive files in a dedicated directory:
//!
//! ```text
//! <snapshots>/
//! ├─ snapshot-20261018-093015-120.lvsnap
//! ├─ snapshot-20261018-101500-004.lvsnap
//! └─ notes.txt                           # not ours: never listed or evicted
//! ```
//!
//! Names encode the UTC creation time with a fixed width, so lexicographic
//! order is chronological order. Files become visible under their final
//! name only after they were fully written and synced.

use crate::codec::{SnapshotCodec, SnapshotFormat};
use crate::error::{SnapshotError, SnapshotResult};
use crate::fsutil::{atomic_write, sync_dir};
use crate::source::EntitySource;
use chrono::{DateTime, NaiveDate, Utc};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Prefix of every snapshot file name.
const NAME_PREFIX: &str = "snapshot-";
/// Suffix of every snapshot file name.
const NAME_SUFFIX: &str = ".lvsnap";
/// Width of the timestamp part: `YYYYMMDD-HHMMSS-mmm`.
const STAMP_LEN: usize = 19;

/// How many local snapshots to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Number of most recent snapshots kept after each creation.
    pub keep_count: usize,
}

impl RetentionPolicy {
    /// Creates a policy keeping `keep_count` snapshots.
    #[must_use]
    pub const fn keep(keep_count: usize) -> Self {
        Self { keep_count }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { keep_count: 5 }
    }
}

/// Summary of one stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMetadata {
    /// File name inside the snapshot directory.
    pub name: String,
    /// Creation time (Unix milliseconds).
    pub created_at: u64,
    /// File size in bytes.
    pub size: u64,
    /// Number of ledgers, or 0 if unknown.
    pub ledger_count: u64,
    /// Number of transactions, or 0 if unknown.
    pub transaction_count: u64,
    /// Device that produced the snapshot, if readable.
    pub origin_device_id: Option<String>,
    /// True if the file could not be decoded and counts are placeholders.
    pub degraded: bool,
}

/// Durable on-disk bookkeeping of snapshots.
#[derive(Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
    codec: SnapshotCodec,
    policy: RetentionPolicy,
}

impl SnapshotStore {
    /// Creates a store over `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>, codec: SnapshotCodec, policy: RetentionPolicy) -> Self {
        Self {
            dir: dir.into(),
            codec,
            policy,
        }
    }

    /// Returns the snapshot directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the retention policy.
    #[must_use]
    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Returns the codec used by this store.
    #[must_use]
    pub fn codec(&self) -> &SnapshotCodec {
        &self.codec
    }

    /// Captures `source` into a new snapshot file, then enforces retention.
    pub fn create(&self, source: &dyn EntitySource) -> SnapshotResult<SnapshotMetadata> {
        let snapshot = self.codec.encode(source)?;
        let bytes = self.codec.to_bytes(&snapshot, SnapshotFormat::Archive)?;
        let metadata = self.store_bytes(&bytes, snapshot.created_at)?;

        info!(
            name = %metadata.name,
            size = metadata.size,
            ledgers = metadata.ledger_count,
            transactions = metadata.transaction_count,
            "created local snapshot"
        );

        self.enforce_retention(self.policy.keep_count)?;
        Ok(metadata)
    }

    /// Accepts externally supplied snapshot bytes into the store.
    ///
    /// The bytes must decode. Document-form input is re-encoded as an archive.
    pub fn import(&self, bytes: &[u8]) -> SnapshotResult<SnapshotMetadata> {
        let snapshot = self.codec.decode(bytes)?;
        let archive;
        let bytes = match SnapshotFormat::sniff(bytes) {
            SnapshotFormat::Archive => bytes,
            SnapshotFormat::Document => {
                archive = self.codec.to_bytes(&snapshot, SnapshotFormat::Archive)?;
                archive.as_slice()
            }
        };

        let metadata = self.store_bytes(bytes, crate::now_millis())?;
        info!(
            name = %metadata.name,
            origin = %snapshot.origin_device_id,
            "imported snapshot"
        );

        self.enforce_retention(self.policy.keep_count)?;
        Ok(metadata)
    }

    fn store_bytes(&self, bytes: &[u8], created_at: u64) -> SnapshotResult<SnapshotMetadata> {
        fs::create_dir_all(&self.dir)?;

        let mut stamp = created_at;
        let mut name = snapshot_name(stamp)?;
        while self.dir.join(&name).exists() {
            stamp += 1;
            name = snapshot_name(stamp)?;
        }

        let path = self.dir.join(&name);
        atomic_write(&path, bytes)?;
        Ok(self.metadata_for(&path, &name))
    }

    /// Lists snapshots, newest first.
    ///
    /// Unreadable or corrupt files get degraded metadata (file timestamps,
    /// zero counts) instead of failing the listing.
    #[must_use]
    pub fn list(&self) -> Vec<SnapshotMetadata> {
        let names = match self.snapshot_names() {
            Ok(names) => names,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!(dir = %self.dir.display(), error = %err, "cannot read snapshot directory");
                return Vec::new();
            }
        };

        let mut entries: Vec<SnapshotMetadata> = names
            .iter()
            .map(|name| self.metadata_for(&self.dir.join(name), name))
            .collect();
        entries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.name.cmp(&a.name))
        });
        entries
    }

    fn metadata_for(&self, path: &Path, name: &str) -> SnapshotMetadata {
        let file_meta = fs::metadata(path).ok();
        let size = file_meta.as_ref().map_or(0, |m| m.len());
        let created_at = parse_snapshot_name(name)
            .or_else(|| file_meta.as_ref().and_then(|m| m.modified().ok()).map(system_millis))
            .unwrap_or(0);

        let summary = File::open(path)
            .map_err(SnapshotError::from)
            .and_then(|file| crate::codec::read_archive_summary(BufReader::new(file)));

        match summary {
            Ok(summary) => SnapshotMetadata {
                name: name.to_string(),
                created_at,
                size,
                ledger_count: summary.ledger_count(),
                transaction_count: summary.transaction_count(),
                origin_device_id: Some(summary.origin_device_id),
                degraded: false,
            },
            Err(err) => {
                warn!(name, error = %err, "snapshot metadata unavailable");
                SnapshotMetadata {
                    name: name.to_string(),
                    created_at,
                    size,
                    ledger_count: 0,
                    transaction_count: 0,
                    origin_device_id: None,
                    degraded: true,
                }
            }
        }
    }

    /// Returns the path of a stored snapshot.
    pub fn path_of(&self, name: &str) -> SnapshotResult<PathBuf> {
        if parse_snapshot_name(name).is_none() {
            return Err(SnapshotError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(self.dir.join(name))
    }

    /// Returns the exact bytes of a stored snapshot.
    pub fn read(&self, name: &str) -> SnapshotResult<Vec<u8>> {
        let path = self.path_of(name)?;
        fs::read(&path).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                SnapshotError::not_found(name)
            } else {
                err.into()
            }
        })
    }

    /// Deletes a stored snapshot. Returns false if it did not exist.
    pub fn delete(&self, name: &str) -> SnapshotResult<bool> {
        let path = self.path_of(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                sync_dir(&self.dir)?;
                info!(name, "deleted local snapshot");
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes a stored snapshot to `dest_dir` in the requested format.
    ///
    /// Returns the path of the written file.
    pub fn export(
        &self,
        name: &str,
        dest_dir: &Path,
        format: SnapshotFormat,
    ) -> SnapshotResult<PathBuf> {
        let bytes = self.read(name)?;
        let (data, file_name) = match format {
            SnapshotFormat::Archive => (bytes, name.to_string()),
            SnapshotFormat::Document => {
                let snapshot = self.codec.decode(&bytes)?;
                let stem = name.strip_suffix(NAME_SUFFIX).unwrap_or(name);
                (
                    self.codec.to_bytes(&snapshot, SnapshotFormat::Document)?,
                    format!("{stem}.{}", format.extension()),
                )
            }
        };

        fs::create_dir_all(dest_dir)?;
        let target = dest_dir.join(file_name);
        atomic_write(&target, &data)?;
        info!(name, target = %target.display(), "exported snapshot");
        Ok(target)
    }

    /// Deletes every snapshot beyond the newest `keep_count`.
    ///
    /// Recency is decided by file modification time (name as tie-breaker).
    /// Files that do not follow the naming convention are never touched.
    /// Returns the number of deleted snapshots.
    pub fn enforce_retention(&self, keep_count: usize) -> SnapshotResult<usize> {
        let mut candidates = Vec::new();
        for name in self.snapshot_names()? {
            let modified = fs::metadata(self.dir.join(&name))?
                .modified()
                .map(system_millis)
                .unwrap_or(0);
            candidates.push((modified, name));
        }
        candidates.sort_by(|a, b| b.cmp(a));

        let mut deleted = 0;
        for (_, name) in candidates.into_iter().skip(keep_count) {
            match fs::remove_file(self.dir.join(&name)) {
                Ok(()) => {
                    debug!(name = %name, "evicted snapshot");
                    deleted += 1;
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }

        if deleted > 0 {
            sync_dir(&self.dir)?;
            info!(deleted, keep_count, "enforced snapshot retention");
        }
        Ok(deleted)
    }

    fn snapshot_names(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if parse_snapshot_name(&name).is_some() && entry.file_type()?.is_file() {
                names.push(name);
            }
        }
        Ok(names)
    }
}

/// Builds the file name for a snapshot created at `millis`.
pub fn snapshot_name(millis: u64) -> SnapshotResult<String> {
    let time = i64::try_from(millis)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or_else(|| SnapshotError::encoding(format!("timestamp out of range: {millis}")))?;
    Ok(format!(
        "{NAME_PREFIX}{}{NAME_SUFFIX}",
        time.format("%Y%m%d-%H%M%S-%3f")
    ))
}

/// Parses a snapshot file name back into its creation time.
///
/// Returns `None` for names outside the naming convention.
#[must_use]
pub fn parse_snapshot_name(name: &str) -> Option<u64> {
    let stamp = name.strip_prefix(NAME_PREFIX)?.strip_suffix(NAME_SUFFIX)?;
    if stamp.len() != STAMP_LEN || !stamp.is_ascii() {
        return None;
    }
    let bytes = stamp.as_bytes();
    if bytes[8] != b'-' || bytes[15] != b'-' {
        return None;
    }

    let digits = |range: std::ops::Range<usize>| -> Option<u32> {
        let part = &stamp[range];
        if part.bytes().all(|b| b.is_ascii_digit()) {
            part.parse().ok()
        } else {
            None
        }
    };

    let year = i32::try_from(digits(0..4)?).ok()?;
    let time = NaiveDate::from_ymd_opt(year, digits(4..6)?, digits(6..8)?)?.and_hms_milli_opt(
        digits(9..11)?,
        digits(11..13)?,
        digits(13..15)?,
        digits(16..19)?,
    )?;
    u64::try_from(time.and_utc().timestamp_millis()).ok()
}

fn system_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
