//! Integration tests for push and pull against an in-memory WebDAV server.

use ledgervault_snapshot::{Collection, EntitySource};
use ledgervault_sync::{SyncError, SyncStatus};
use ledgervault_testkit::prelude::*;
use ledgervault_webdav::DavMethod;
use serde_json::Value;
use std::thread;
use std::time::Duration;

const ARCHIVE: &str = "LedgerVault/sync/data.lvsnap";
const META: &str = "LedgerVault/sync/meta.json";

fn meta_without_time(dav: &MemoryDav) -> Value {
    let mut meta: Value = serde_json::from_slice(&dav.file(META).unwrap()).unwrap();
    meta.as_object_mut().unwrap().remove("lastSyncTime");
    meta
}

#[test]
fn push_creates_collections_and_uploads() {
    let dav = MemoryDav::new();
    let engine = TestEngine::with_dav(&dav);
    populate(engine.data(), &sample_entities());

    let report = engine.push().unwrap();

    assert!(dav.has_collection("LedgerVault"));
    assert!(dav.has_collection("LedgerVault/sync"));
    assert_eq!(report.bytes, dav.file(ARCHIVE).unwrap().len() as u64);
    assert_eq!(report.ledger_count, 2);
    assert_eq!(report.transaction_count, 5);
    assert_eq!(engine.status(), SyncStatus::Idle);

    let stored = engine.remote_descriptor().unwrap().unwrap();
    assert!(stored.last_sync_time.is_some());
}

#[test]
fn push_twice_uploads_identical_archive() {
    let dav = MemoryDav::new();
    let engine = TestEngine::with_dav(&dav);
    populate(engine.data(), &sample_entities());

    engine.push().unwrap();
    let first_archive = dav.file(ARCHIVE).unwrap();
    let first_meta = meta_without_time(&dav);

    dav.clear_log();
    engine.push().unwrap();

    assert_eq!(dav.file(ARCHIVE).unwrap(), first_archive);
    assert_eq!(meta_without_time(&dav), first_meta);
    assert_eq!(dav.count(DavMethod::Mkcol), 0);
}

#[test]
fn push_then_pull_on_another_device() {
    let dav = MemoryDav::new();
    let source = TestEngine::with_dav(&dav);
    populate(source.data(), &sample_entities());
    source.push().unwrap();

    let target = TestEngine::with_dav(&dav);
    populate(target.data(), &alternate_entities());
    let report = target.pull().unwrap();

    assert_eq!(target.data().read_all().unwrap(), sample_entities());
    assert_eq!(target.fingerprint().unwrap(), source.fingerprint().unwrap());
    assert_eq!(
        target.data().revision().unwrap(),
        source.data().revision().unwrap()
    );
    assert_eq!(report.ledger_count, 2);
    assert_eq!(target.status(), SyncStatus::Idle);
    assert!(target.remote_descriptor().unwrap().unwrap().last_sync_time.is_some());
}

#[test]
fn remote_sync_info_reflects_last_push() {
    let dav = MemoryDav::new();
    let engine = TestEngine::with_dav(&dav);
    assert_eq!(engine.get_remote_sync_info().unwrap(), None);

    populate(engine.data(), &sample_entities());
    engine.push().unwrap();

    let meta = engine.get_remote_sync_info().unwrap().unwrap();
    assert_eq!(meta.device_id, engine.device_id().unwrap());
    assert_eq!(meta.version, 1);
    assert!(meta.last_sync_time > 0);
}

#[test]
fn corrupt_remote_meta_is_reported() {
    let dav = MemoryDav::new();
    let engine = TestEngine::with_dav(&dav);
    dav.put_file(META, b"{not json".to_vec());

    let err = engine.get_remote_sync_info().unwrap_err();
    assert!(matches!(err, SyncError::CorruptSnapshot(_)));
}

#[test]
fn unconfigured_engine_sends_nothing() {
    let dav = MemoryDav::new();
    let engine = TestEngine::unconfigured(&dav);

    assert!(matches!(engine.push(), Err(SyncError::NotConfigured { .. })));
    assert!(matches!(engine.pull(), Err(SyncError::NotConfigured { .. })));
    assert!(dav.requests().is_empty());
}

#[test]
fn rejected_credentials_surface_status() {
    let dav = MemoryDav::new();
    dav.require_credentials(USERNAME, "another-password");
    let engine = TestEngine::with_dav(&dav);
    populate(engine.data(), &sample_entities());

    let err = engine.test_remote_connection(&memory_descriptor()).unwrap_err();
    assert_eq!(err.status(), Some(401));

    let err = engine.push().unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(matches!(engine.status(), SyncStatus::Failed { .. }));
    assert!(dav.file(ARCHIVE).is_none());
}

#[test]
fn connection_test_accepts_valid_credentials() {
    let dav = MemoryDav::new();
    dav.require_credentials(USERNAME, SECRET);
    let engine = TestEngine::unconfigured(&dav);

    engine.test_remote_connection(&memory_descriptor()).unwrap();

    let mut incomplete = memory_descriptor();
    incomplete.username.clear();
    assert!(matches!(
        engine.test_remote_connection(&incomplete),
        Err(SyncError::NotConfigured { .. })
    ));
}

#[test]
fn offline_push_is_retryable() {
    let dav = MemoryDav::new();
    let engine = TestEngine::with_dav(&dav);
    dav.set_offline(true);

    let err = engine.push().unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.status(), None);

    dav.set_offline(false);
    engine.push().unwrap();
}

#[test]
fn second_operation_is_rejected_while_uploading() {
    let dav = MemoryDav::new();
    let engine = TestEngine::with_dav(&dav);
    populate(engine.data(), &sample_entities());
    dav.pause(DavMethod::Put);

    thread::scope(|scope| {
        let push = scope.spawn(|| engine.push());
        assert!(dav.wait_until_paused(Duration::from_secs(10)));

        assert_eq!(engine.status(), SyncStatus::Uploading);
        assert_eq!(engine.pull().unwrap_err(), SyncError::SyncInProgress);
        assert_eq!(engine.push().unwrap_err(), SyncError::SyncInProgress);
        assert_eq!(
            engine.restore_from_local_snapshot("snapshot-20260101-000000-000.lvsnap")
                .unwrap_err(),
            SyncError::SyncInProgress
        );

        dav.release();
        push.join().unwrap().unwrap();
    });

    assert_eq!(engine.status(), SyncStatus::Idle);
}

#[test]
fn cancelled_pull_leaves_data_untouched() {
    let dav = MemoryDav::new();
    let source = TestEngine::with_dav(&dav);
    populate(source.data(), &sample_entities());
    source.push().unwrap();

    let target = TestEngine::with_dav(&dav);
    populate(target.data(), &alternate_entities());
    let before = tree_checksum(target.data().path());
    dav.pause(DavMethod::Get);

    thread::scope(|scope| {
        let pull = scope.spawn(|| target.pull());
        assert!(dav.wait_until_paused(Duration::from_secs(10)));
        assert_eq!(target.status(), SyncStatus::Downloading);

        target.cancel();
        dav.release();
        assert_eq!(pull.join().unwrap().unwrap_err(), SyncError::Cancelled);
    });

    assert_eq!(tree_checksum(target.data().path()), before);
    assert!(matches!(target.status(), SyncStatus::Failed { .. }));

    // The next operation starts clean.
    target.pull().unwrap();
    assert_eq!(target.data().read_all().unwrap().count(Collection::Ledgers), 2);
}

#[test]
fn pull_succeeds_when_sync_time_cannot_be_recorded() {
    let dav = MemoryDav::new();
    let source = TestEngine::with_dav(&dav);
    populate(source.data(), &sample_entities());
    source.push().unwrap();

    let target = TestEngine::with_dav(&dav);
    populate(target.data(), &alternate_entities());
    dav.pause(DavMethod::Get);

    thread::scope(|scope| {
        let pull = scope.spawn(|| target.pull());
        assert!(dav.wait_until_paused(Duration::from_secs(10)));

        std::fs::write(target.config().descriptor_path(), b"{broken").unwrap();
        dav.release();

        let report = pull.join().unwrap().unwrap();
        assert_eq!(report.ledger_count, 2);
    });

    assert_eq!(target.data().read_all().unwrap(), sample_entities());
    assert_eq!(target.status(), SyncStatus::Idle);
}
