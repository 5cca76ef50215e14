//! Integration tests for the local snapshot store.

use ledgervault_snapshot::{
    Collection, DataDir, DeviceIdentity, EntitySource, Record, RetentionPolicy, SnapshotCodec,
    SnapshotStore,
};
use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

fn open(root: &std::path::Path, keep: usize) -> (DataDir, SnapshotStore) {
    let data = DataDir::open(root.join("data"), 1).unwrap();
    let identity = Arc::new(DeviceIdentity::new(root.join("device-id")));
    let store = SnapshotStore::new(
        root.join("snapshots"),
        SnapshotCodec::new(identity),
        RetentionPolicy::keep(keep),
    );
    (data, store)
}

#[test]
fn retention_keeps_newest_five_of_seven() {
    let dir = tempdir().unwrap();
    let (data, store) = open(dir.path(), 5);

    let mut created = Vec::new();
    for i in 0..7 {
        data.replace_all(
            Collection::Ledgers,
            &[Record::new(format!("L{i}"), json!({"n": i}))],
        )
        .unwrap();
        created.push(store.create(&data).unwrap().name);
    }

    let listed: Vec<String> = store.list().into_iter().map(|m| m.name).collect();
    let expected: Vec<String> = created[2..].iter().rev().cloned().collect();
    assert_eq!(listed, expected);

    for evicted in &created[..2] {
        assert!(!store.dir().join(evicted).exists());
    }
}

#[test]
fn device_id_is_stable_across_snapshots() {
    let dir = tempdir().unwrap();
    let (data, store) = open(dir.path(), 5);

    let first = store.create(&data).unwrap();
    let second = store.create(&data).unwrap();
    assert_eq!(first.origin_device_id, second.origin_device_id);

    let persisted = fs::read_to_string(dir.path().join("device-id")).unwrap();
    assert_eq!(first.origin_device_id.as_deref(), Some(persisted.trim()));
}

#[test]
fn restored_bytes_decode_to_captured_state() {
    let dir = tempdir().unwrap();
    let (data, store) = open(dir.path(), 5);
    data.replace_all(
        Collection::Transactions,
        &[
            Record::owned("t1", "L1", json!({"amount": -12.5})),
            Record::owned("t2", "L1", json!({"amount": 3})),
        ],
    )
    .unwrap();

    let meta = store.create(&data).unwrap();
    assert_eq!(meta.transaction_count, 2);

    let snapshot = store.codec().decode(&store.read(&meta.name).unwrap()).unwrap();
    assert_eq!(snapshot.entities, data.read_all().unwrap());
}
