//! Packed archive encoding of snapshots.
//!
//! ## Layout
//!
//! A tar stream with deterministic headers (mtime 0, uid/gid 0, fixed modes)
//! and entries in a fixed order:
//!
//! ```text
//! MANIFEST                         CBOR ArchiveManifest
//! ledgers/                         directory entry (always present)
//! ledgers/records.cbor             CBOR array of records
//! transactions/
//! transactions/<ledger>.cbor       one shard per owning ledger
//! ...                              one sub-tree per collection
//! ```
//!
//! Identical snapshots always produce identical bytes.

use super::cbor::{decode_records, encode_records, from_cbor, to_cbor};
use super::SnapshotSummary;
use crate::error::{SnapshotError, SnapshotResult};
use crate::model::{is_valid_shard_name, Collection, EntitySet, Snapshot};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};
use std::path::Component;
use tar::{Archive, Builder, EntryType, Header};

/// Name of the manifest entry.
pub const MANIFEST_ENTRY: &str = "MANIFEST";
/// Current archive layout version.
pub const ARCHIVE_LAYOUT: u32 = 1;
/// File extension of shard entries.
const SHARD_EXTENSION: &str = ".cbor";

/// First entry of every archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    /// Archive layout version.
    pub layout: u32,
    /// Entity schema version.
    pub format_version: u32,
    /// Snapshot creation time (Unix milliseconds).
    pub created_at: u64,
    /// Device that produced the snapshot.
    pub origin_device_id: String,
    /// Record count per collection.
    pub counts: BTreeMap<Collection, u64>,
}

impl ArchiveManifest {
    fn for_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            layout: ARCHIVE_LAYOUT,
            format_version: snapshot.format_version,
            created_at: snapshot.created_at,
            origin_device_id: snapshot.origin_device_id.clone(),
            counts: snapshot.entities.counts(),
        }
    }

    fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            format_version: self.format_version,
            created_at: self.created_at,
            origin_device_id: self.origin_device_id.clone(),
            counts: self.counts.clone(),
        }
    }
}

/// Encodes a snapshot as a packed archive.
pub fn write_archive(snapshot: &Snapshot) -> SnapshotResult<Vec<u8>> {
    let mut builder = Builder::new(Vec::new());

    let manifest = to_cbor(&ArchiveManifest::for_snapshot(snapshot))?;
    append(&mut builder, MANIFEST_ENTRY, EntryType::Regular, &manifest)?;

    for collection in Collection::ALL {
        append(&mut builder, collection.as_str(), EntryType::Directory, &[])?;
        for (shard, records) in snapshot.entities.shards(collection) {
            let data = encode_records(&records)?;
            let path = format!("{}/{}{}", collection.as_str(), shard, SHARD_EXTENSION);
            append(&mut builder, &path, EntryType::Regular, &data)?;
        }
    }

    Ok(builder.into_inner()?)
}

fn append(
    builder: &mut Builder<Vec<u8>>,
    path: &str,
    entry_type: EntryType,
    data: &[u8],
) -> SnapshotResult<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_size(data.len() as u64);
    header.set_mode(if entry_type == EntryType::Directory {
        0o755
    } else {
        0o644
    });
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    builder.append_data(&mut header, path, data)?;
    Ok(())
}

/// Where an archive entry belongs.
enum EntryTarget {
    Manifest,
    Directory(Collection),
    Shard(Collection),
}

fn classify(path: &std::path::Path, is_dir: bool) -> SnapshotResult<EntryTarget> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            _ => {
                return Err(SnapshotError::corrupt(format!(
                    "illegal archive path: {}",
                    path.display()
                )))
            }
        }
    }

    let unexpected = || SnapshotError::corrupt(format!("unexpected archive entry: {}", path.display()));

    match parts.as_slice() {
        [name] if !is_dir && name == MANIFEST_ENTRY => Ok(EntryTarget::Manifest),
        [dir] if is_dir => Collection::from_name(dir)
            .map(EntryTarget::Directory)
            .ok_or_else(unexpected),
        [dir, file] if !is_dir => {
            let collection = Collection::from_name(dir).ok_or_else(unexpected)?;
            let shard = file.strip_suffix(SHARD_EXTENSION).ok_or_else(unexpected)?;
            if is_valid_shard_name(shard) {
                Ok(EntryTarget::Shard(collection))
            } else {
                Err(unexpected())
            }
        }
        _ => Err(unexpected()),
    }
}

/// Decodes and fully verifies a packed archive.
///
/// The archive is rejected unless it has a manifest, a sub-tree for every
/// collection, and record counts that match the manifest.
pub fn read_archive(bytes: &[u8]) -> SnapshotResult<Snapshot> {
    let corrupt = |e: std::io::Error| SnapshotError::corrupt(format!("unreadable archive: {e}"));

    let mut archive = Archive::new(Cursor::new(bytes));
    let mut manifest: Option<ArchiveManifest> = None;
    let mut seen = BTreeSet::new();
    let mut entities = EntitySet::new();

    for entry in archive.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        let entry_type = entry.header().entry_type();
        let path = entry.path().map_err(corrupt)?.into_owned();

        match classify(&path, entry_type.is_dir())? {
            EntryTarget::Manifest => {
                let mut data = Vec::new();
                entry.read_to_end(&mut data).map_err(corrupt)?;
                manifest = Some(from_cbor(&data)?);
            }
            EntryTarget::Directory(collection) => {
                seen.insert(collection);
            }
            EntryTarget::Shard(collection) => {
                seen.insert(collection);
                let mut data = Vec::new();
                entry.read_to_end(&mut data).map_err(corrupt)?;
                for record in decode_records(&data)? {
                    entities.push(collection, record);
                }
            }
        }
    }

    let manifest = manifest.ok_or_else(|| SnapshotError::corrupt("archive has no manifest"))?;
    if manifest.layout > ARCHIVE_LAYOUT {
        return Err(SnapshotError::corrupt(format!(
            "unsupported archive layout: {}",
            manifest.layout
        )));
    }

    for collection in Collection::ALL {
        if !seen.contains(&collection) {
            return Err(SnapshotError::corrupt(format!(
                "archive is missing collection {collection}"
            )));
        }
        let expected = manifest.counts.get(&collection).copied().unwrap_or(0);
        let actual = entities.count(collection) as u64;
        if expected != actual {
            return Err(SnapshotError::corrupt(format!(
                "collection {collection}: manifest lists {expected} records, archive holds {actual}"
            )));
        }
    }

    Ok(Snapshot {
        format_version: manifest.format_version,
        created_at: manifest.created_at,
        origin_device_id: manifest.origin_device_id,
        entities,
    })
}

/// Reads only the manifest of an archive.
///
/// The manifest is the first entry, so this never touches record data.
pub fn read_archive_summary<R: Read>(reader: R) -> SnapshotResult<SnapshotSummary> {
    let corrupt = |e: std::io::Error| SnapshotError::corrupt(format!("unreadable archive: {e}"));

    let mut archive = Archive::new(reader);
    let mut entries = archive.entries().map_err(corrupt)?;
    let mut entry = entries
        .next()
        .ok_or_else(|| SnapshotError::corrupt("empty archive"))?
        .map_err(corrupt)?;

    let path = entry.path().map_err(corrupt)?.into_owned();
    if path.as_os_str() != MANIFEST_ENTRY {
        return Err(SnapshotError::corrupt("archive does not start with a manifest"));
    }

    let mut data = Vec::new();
    entry.read_to_end(&mut data).map_err(corrupt)?;
    let manifest: ArchiveManifest = from_cbor(&data)?;
    Ok(manifest.summary())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;
    use serde_json::json;

    fn sample() -> Snapshot {
        let entities = EntitySet::new()
            .with(Collection::Ledgers, Record::new("L1", json!({"name": "Home"})))
            .with(Collection::Ledgers, Record::new("L2", json!({"name": "Trip"})))
            .with(Collection::Transactions, Record::owned("t1", "L1", json!({"amount": 10})))
            .with(Collection::Transactions, Record::owned("t2", "L2", json!({"amount": 20})))
            .with(Collection::Settings, Record::new("theme", json!("dark")));
        Snapshot::new(3, 1_700_000_000_000, "device-a", entities)
    }

    #[test]
    fn archive_round_trip() {
        let snapshot = sample();
        let bytes = write_archive(&snapshot).unwrap();
        let decoded = read_archive(&bytes).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn archive_is_deterministic() {
        let snapshot = sample();
        assert_eq!(write_archive(&snapshot).unwrap(), write_archive(&snapshot).unwrap());
    }

    #[test]
    fn empty_snapshot_keeps_every_collection() {
        let snapshot = Snapshot::new(1, 5, "d", EntitySet::new());
        let bytes = write_archive(&snapshot).unwrap();
        let decoded = read_archive(&bytes).unwrap();
        assert_eq!(decoded.entities.total(), 0);
        assert_eq!(decoded.entities.counts().len(), Collection::ALL.len());
    }

    #[test]
    fn summary_reads_manifest_only() {
        let bytes = write_archive(&sample()).unwrap();
        let summary = read_archive_summary(Cursor::new(&bytes)).unwrap();
        assert_eq!(summary.format_version, 3);
        assert_eq!(summary.created_at, 1_700_000_000_000);
        assert_eq!(summary.origin_device_id, "device-a");
        assert_eq!(summary.counts[&Collection::Ledgers], 2);
        assert_eq!(summary.counts[&Collection::Transactions], 2);
    }

    #[test]
    fn truncated_archive_is_corrupt() {
        let bytes = write_archive(&sample()).unwrap();
        let truncated = &bytes[..bytes.len() / 3];
        let err = read_archive(truncated).unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn empty_input_is_corrupt() {
        assert!(read_archive(&[]).unwrap_err().is_corrupt());
        assert!(read_archive_summary(Cursor::new(Vec::new()))
            .unwrap_err()
            .is_corrupt());
    }

    #[test]
    fn foreign_entries_are_rejected() {
        let mut builder = Builder::new(Vec::new());
        let manifest = to_cbor(&ArchiveManifest::for_snapshot(&sample())).unwrap();
        append(&mut builder, MANIFEST_ENTRY, EntryType::Regular, &manifest).unwrap();
        append(&mut builder, "notes/readme.txt", EntryType::Regular, b"hi").unwrap();
        let bytes = builder.into_inner().unwrap();

        let err = read_archive(&bytes).unwrap_err();
        assert!(err.to_string().contains("unexpected archive entry"));
    }

    #[test]
    fn count_mismatch_is_rejected() {
        let snapshot = sample();
        let mut manifest = ArchiveManifest::for_snapshot(&snapshot);
        manifest.counts.insert(Collection::Ledgers, 7);

        let mut builder = Builder::new(Vec::new());
        let data = to_cbor(&manifest).unwrap();
        append(&mut builder, MANIFEST_ENTRY, EntryType::Regular, &data).unwrap();
        for collection in Collection::ALL {
            append(&mut builder, collection.as_str(), EntryType::Directory, &[]).unwrap();
        }
        let bytes = builder.into_inner().unwrap();

        let err = read_archive(&bytes).unwrap_err();
        assert!(err.to_string().contains("manifest lists"));
    }
}
