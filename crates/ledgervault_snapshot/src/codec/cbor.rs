//! CBOR encoding of record shards.

use crate::error::{SnapshotError, SnapshotResult};
use crate::model::Record;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a shard (an array of records) to CBOR.
pub fn encode_records(records: &[&Record]) -> SnapshotResult<Vec<u8>> {
    to_cbor(&records)
}

/// Decodes a shard previously written by [`encode_records`].
pub fn decode_records(bytes: &[u8]) -> SnapshotResult<Vec<Record>> {
    from_cbor(bytes)
}

/// Serializes any value to CBOR.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> SnapshotResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::into_writer(value, &mut buffer)
        .map_err(|e| SnapshotError::encoding(format!("CBOR encoding failed: {e}")))?;
    Ok(buffer)
}

/// Deserializes a value from CBOR, reporting failures as corruption.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> SnapshotResult<T> {
    ciborium::from_reader(bytes)
        .map_err(|e| SnapshotError::corrupt(format!("CBOR decoding failed: {e}")))
}
