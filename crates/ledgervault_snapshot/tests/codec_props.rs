//! Property tests for the snapshot codec.

use ledgervault_snapshot::{
    decode, fingerprint, Collection, DeviceIdentity, EntitySet, Record, Snapshot, SnapshotCodec,
    SnapshotFormat,
};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn arb_record(sharded: bool) -> impl Strategy<Value = Record> {
    (
        "[a-z0-9]{1,12}",
        proptest::option::of("[A-Za-z0-9_-]{1,8}"),
        any::<i32>(),
        ".{0,16}",
    )
        .prop_map(move |(id, owner, amount, note)| {
            let data = json!({"amount": amount, "note": note});
            match owner {
                Some(owner) if sharded => Record::owned(id, owner, data),
                _ => Record::new(id, data),
            }
        })
}

fn arb_entities() -> impl Strategy<Value = EntitySet> {
    (
        prop::collection::vec(arb_record(false), 0..4),
        prop::collection::vec(arb_record(true), 0..12),
        prop::collection::vec(arb_record(false), 0..4),
    )
        .prop_map(|(ledgers, transactions, categories)| {
            let mut set = EntitySet::new();
            set.set(Collection::Ledgers, ledgers);
            set.set(Collection::Transactions, transactions);
            set.set(Collection::Categories, categories);
            set
        })
}

/// Canonical per-collection form: sharding regroups records by owner.
fn canonical(set: &EntitySet) -> Vec<(Collection, Vec<Record>)> {
    Collection::ALL
        .into_iter()
        .map(|c| {
            let mut records = set.get(c).to_vec();
            records.sort_by_key(|r| (r.owner.clone(), r.id.clone(), r.data.to_string()));
            (c, records)
        })
        .collect()
}

proptest! {
    #[test]
    fn both_formats_preserve_content(entities in arb_entities(), created_at in 0u64..4_000_000_000_000) {
        let codec = SnapshotCodec::new(Arc::new(DeviceIdentity::fixed("prop")));
        let snapshot = Snapshot::new(1, created_at, "prop", entities);

        for format in [SnapshotFormat::Archive, SnapshotFormat::Document] {
            let bytes = codec.to_bytes(&snapshot, format).unwrap();
            let decoded = decode(&bytes).unwrap();
            prop_assert_eq!(decoded.created_at, created_at);
            prop_assert_eq!(canonical(&decoded.entities), canonical(&snapshot.entities));
            prop_assert_eq!(fingerprint(&decoded.entities), fingerprint(&snapshot.entities));
        }
    }

    #[test]
    fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..2048)) {
        let _ = decode(&bytes);
    }
}
