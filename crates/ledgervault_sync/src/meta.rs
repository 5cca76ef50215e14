//! Remote sync metadata document.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};

/// Small JSON document uploaded next to the remote archive.
///
/// Lets another device see when the remote snapshot was produced, and by
/// whom, without downloading the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSyncMeta {
    /// Upload time (Unix milliseconds).
    pub last_sync_time: u64,
    /// Device that uploaded the archive.
    pub device_id: String,
    /// Entity schema version of the archive.
    pub version: u32,
}

impl RemoteSyncMeta {
    /// Serializes to JSON.
    pub fn to_json(&self) -> SyncResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| SyncError::staging(format!("metadata encoding failed: {e}")))
    }

    /// Parses a downloaded metadata document.
    pub fn from_json(bytes: &[u8]) -> SyncResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| SyncError::CorruptSnapshot(format!("invalid remote metadata: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_field_names() {
        let meta = RemoteSyncMeta {
            last_sync_time: 1_700_000_000_000,
            device_id: "d-1".into(),
            version: 3,
        };
        let json = String::from_utf8(meta.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            r#"{"lastSyncTime":1700000000000,"deviceId":"d-1","version":3}"#
        );
        assert_eq!(RemoteSyncMeta::from_json(json.as_bytes()).unwrap(), meta);
    }

    #[test]
    fn malformed_metadata() {
        let err = RemoteSyncMeta::from_json(b"<html>").unwrap_err();
        assert!(matches!(err, SyncError::CorruptSnapshot(_)));
    }
}
