//! Single-document snapshot encoding.
//!
//! This is the format of the older local-only backups: one JSON object with
//! every collection inline. It is still accepted on import and restore, and
//! can be produced on export for tools that want plain JSON.

use super::SnapshotSummary;
use crate::error::{SnapshotError, SnapshotResult};
use crate::model::{Collection, EntitySet, Record, Snapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotDocument {
    format_version: u32,
    created_at: u64,
    device_id: String,
    /// Collections missing from older documents decode as empty.
    #[serde(default)]
    collections: BTreeMap<Collection, Vec<Record>>,
}

/// Encodes a snapshot as a pretty-printed JSON document.
pub fn write_document(snapshot: &Snapshot) -> SnapshotResult<Vec<u8>> {
    let document = SnapshotDocument {
        format_version: snapshot.format_version,
        created_at: snapshot.created_at,
        device_id: snapshot.origin_device_id.clone(),
        collections: Collection::ALL
            .into_iter()
            .map(|c| (c, snapshot.entities.get(c).to_vec()))
            .collect(),
    };
    serde_json::to_vec_pretty(&document)
        .map_err(|e| SnapshotError::encoding(format!("JSON encoding failed: {e}")))
}

/// Decodes a JSON snapshot document.
pub fn read_document(bytes: &[u8]) -> SnapshotResult<Snapshot> {
    let document = parse(bytes)?;
    let mut entities = EntitySet::new();
    for (collection, records) in document.collections {
        entities.set(collection, records);
    }
    Ok(Snapshot {
        format_version: document.format_version,
        created_at: document.created_at,
        origin_device_id: document.device_id,
        entities,
    })
}

/// Reads the header fields and counts of a JSON snapshot document.
pub fn read_document_summary(bytes: &[u8]) -> SnapshotResult<SnapshotSummary> {
    let document = parse(bytes)?;
    let counts = Collection::ALL
        .into_iter()
        .map(|c| {
            let count = document.collections.get(&c).map_or(0, Vec::len) as u64;
            (c, count)
        })
        .collect();
    Ok(SnapshotSummary {
        format_version: document.format_version,
        created_at: document.created_at,
        origin_device_id: document.device_id,
        counts,
    })
}

fn parse(bytes: &[u8]) -> SnapshotResult<SnapshotDocument> {
    serde_json::from_slice(bytes)
        .map_err(|e| SnapshotError::corrupt(format!("invalid snapshot document: {e}")))
}
