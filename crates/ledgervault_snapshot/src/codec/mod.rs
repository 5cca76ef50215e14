//! Snapshot codec.
//!
//! Converts between live application state and serialized snapshots.
//! Two encodings are understood:
//!
//! - [`SnapshotFormat::Archive`]: packed tar archive, one sub-tree per
//!   collection. This is what the local store and the remote store hold.
//! - [`SnapshotFormat::Document`]: one JSON document with every collection
//!   inline, as written by older local-only backups.
//!
//! [`SnapshotCodec::decode`] accepts either and tells them apart by their
//! first byte.

mod archive;
pub mod cbor;
mod document;

pub use archive::{read_archive_summary, ArchiveManifest, ARCHIVE_LAYOUT, MANIFEST_ENTRY};

use crate::error::SnapshotResult;
use crate::identity::DeviceIdentity;
use crate::model::{Collection, EntitySet, Snapshot};
use crate::source::EntitySource;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Serialized representation of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    /// Packed multi-entry archive.
    Archive,
    /// Single JSON document.
    Document,
}

impl SnapshotFormat {
    /// Detects the format of a serialized snapshot.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Self {
        match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => SnapshotFormat::Document,
            _ => SnapshotFormat::Archive,
        }
    }

    /// Conventional file extension.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            SnapshotFormat::Archive => "lvsnap",
            SnapshotFormat::Document => "json",
        }
    }
}

/// Header information of a serialized snapshot, read without decoding records.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSummary {
    /// Entity schema version.
    pub format_version: u32,
    /// Snapshot creation time (Unix milliseconds).
    pub created_at: u64,
    /// Device that produced the snapshot.
    pub origin_device_id: String,
    /// Record count per collection.
    pub counts: BTreeMap<Collection, u64>,
}

impl SnapshotSummary {
    /// Number of ledgers.
    #[must_use]
    pub fn ledger_count(&self) -> u64 {
        self.counts.get(&Collection::Ledgers).copied().unwrap_or(0)
    }

    /// Number of transactions.
    #[must_use]
    pub fn transaction_count(&self) -> u64 {
        self.counts.get(&Collection::Transactions).copied().unwrap_or(0)
    }
}

/// Encodes application state into snapshots and back.
#[derive(Debug, Clone)]
pub struct SnapshotCodec {
    identity: Arc<DeviceIdentity>,
}

impl SnapshotCodec {
    /// Creates a codec that stamps snapshots with the given device identity.
    pub fn new(identity: Arc<DeviceIdentity>) -> Self {
        Self { identity }
    }

    /// Returns the device identity used for new snapshots.
    #[must_use]
    pub fn identity(&self) -> &Arc<DeviceIdentity> {
        &self.identity
    }

    /// Captures the current state of `source`, stamped with the current time.
    pub fn encode(&self, source: &dyn EntitySource) -> SnapshotResult<Snapshot> {
        self.encode_at(source, crate::now_millis())
    }

    /// Captures the current state of `source` with an explicit creation time.
    pub fn encode_at(&self, source: &dyn EntitySource, created_at: u64) -> SnapshotResult<Snapshot> {
        let entities = source.read_all()?;
        Ok(Snapshot {
            format_version: source.format_version()?,
            created_at,
            origin_device_id: self.identity.get_or_create()?,
            entities,
        })
    }

    /// Serializes a snapshot in the requested format.
    pub fn to_bytes(&self, snapshot: &Snapshot, format: SnapshotFormat) -> SnapshotResult<Vec<u8>> {
        match format {
            SnapshotFormat::Archive => archive::write_archive(snapshot),
            SnapshotFormat::Document => document::write_document(snapshot),
        }
    }

    /// Parses a serialized snapshot of either format.
    ///
    /// Fails with `CorruptSnapshot` if the bytes are not valid. Nothing is
    /// returned unless the whole buffer decoded.
    pub fn decode(&self, bytes: &[u8]) -> SnapshotResult<Snapshot> {
        decode(bytes)
    }

    /// Reads the header of a serialized snapshot of either format.
    pub fn summary(&self, bytes: &[u8]) -> SnapshotResult<SnapshotSummary> {
        match SnapshotFormat::sniff(bytes) {
            SnapshotFormat::Archive => read_archive_summary(bytes),
            SnapshotFormat::Document => document::read_document_summary(bytes),
        }
    }

    /// Computes the advisory content fingerprint of `source`.
    pub fn fingerprint(&self, source: &dyn EntitySource) -> SnapshotResult<String> {
        Ok(fingerprint(&source.read_all()?))
    }
}

/// Parses a serialized snapshot of either format.
pub fn decode(bytes: &[u8]) -> SnapshotResult<Snapshot> {
    match SnapshotFormat::sniff(bytes) {
        SnapshotFormat::Archive => archive::read_archive(bytes),
        SnapshotFormat::Document => document::read_document(bytes),
    }
}

/// Computes a short digest of record counts.
///
/// Covers the number of transactions per ledger plus the number of
/// categories, budgets and savings plans. It is a cheap "did anything
/// change" hint; collisions are possible and it must not drive decisions.
#[must_use]
pub fn fingerprint(entities: &EntitySet) -> String {
    let mut per_ledger: BTreeMap<&str, u64> = BTreeMap::new();
    for record in entities.get(Collection::Transactions) {
        *per_ledger.entry(record.owner.as_deref().unwrap_or("")).or_default() += 1;
    }

    let mut hasher = Sha256::new();
    for (ledger, count) in &per_ledger {
        hasher.update(ledger.as_bytes());
        hasher.update([0u8]);
        hasher.update(count.to_le_bytes());
    }
    for collection in [
        Collection::Categories,
        Collection::Budgets,
        Collection::SavingsPlans,
    ] {
        hasher.update(collection.as_str().as_bytes());
        hasher.update((entities.count(collection) as u64).to_le_bytes());
    }

    hasher
        .finalize()
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;
    use serde_json::json;

    #[test]
    fn sniff_formats() {
        assert_eq!(SnapshotFormat::sniff(b"  {\"a\":1}"), SnapshotFormat::Document);
        assert_eq!(SnapshotFormat::sniff(b"MANIFEST"), SnapshotFormat::Archive);
        assert_eq!(SnapshotFormat::sniff(b""), SnapshotFormat::Archive);
    }

    #[test]
    fn decode_accepts_both_formats() {
        let identity = Arc::new(DeviceIdentity::fixed("d"));
        let codec = SnapshotCodec::new(identity);
        let entities = EntitySet::new().with(Collection::Ledgers, Record::new("L", json!({})));
        let snapshot = Snapshot::new(1, 2, "d", entities);

        for format in [SnapshotFormat::Archive, SnapshotFormat::Document] {
            let bytes = codec.to_bytes(&snapshot, format).unwrap();
            assert_eq!(codec.decode(&bytes).unwrap(), snapshot);
            assert_eq!(codec.summary(&bytes).unwrap().ledger_count(), 1);
        }
    }

    #[test]
    fn fingerprint_ignores_order() {
        let a = EntitySet::new()
            .with(Collection::Transactions, Record::owned("t1", "L1", json!(1)))
            .with(Collection::Transactions, Record::owned("t2", "L2", json!(2)));
        let b = EntitySet::new()
            .with(Collection::Transactions, Record::owned("t2", "L2", json!(2)))
            .with(Collection::Transactions, Record::owned("t1", "L1", json!(1)));
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).len(), 16);
    }

    #[test]
    fn fingerprint_tracks_counts() {
        let base = EntitySet::new();
        let with_budget = base
            .clone()
            .with(Collection::Budgets, Record::new("b", json!({})));
        assert_ne!(fingerprint(&base), fingerprint(&with_budget));
    }
}
