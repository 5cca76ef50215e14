//! Sync orchestrator.
//!
//! Composes the codec, the local snapshot store, the WebDAV transport and
//! the stager into the operations the application calls.
//!
//! ## Key Invariants
//!
//! - At most one push, pull or restore runs at a time
//! - Nothing local changes before a downloaded snapshot is fully decoded
//! - A failed apply leaves the data directory exactly as it was
//! - No operation is retried internally

use crate::config::{DescriptorFile, EngineConfig, RemoteSyncDescriptor};
use crate::error::{SyncError, SyncResult};
use crate::meta::RemoteSyncMeta;
use crate::staging::{RecoveryOutcome, Stager, StdTreeOps, TreeOps};
use crate::state::{OperationGuard, StatusCell, SyncStatus};
use ledgervault_snapshot::{
    now_millis, DataDir, DeviceIdentity, EntitySource, RetentionPolicy, Snapshot, SnapshotCodec,
    SnapshotFormat, SnapshotMetadata, SnapshotStore,
};
use ledgervault_webdav::{DavClient, HttpDavClient, WebDavClient};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

const ARCHIVE_CONTENT_TYPE: &str = "application/x-tar";
const META_CONTENT_TYPE: &str = "application/json";

/// Outcome of a successful push, pull or restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Size of the transferred archive in bytes.
    pub bytes: u64,
    /// Number of ledgers in the snapshot.
    pub ledger_count: u64,
    /// Number of transactions in the snapshot.
    pub transaction_count: u64,
    /// Creation time of the snapshot (Unix milliseconds).
    pub snapshot_time: u64,
    /// Time the operation completed (Unix milliseconds).
    pub completed_at: u64,
}

impl SyncReport {
    fn new(snapshot: &Snapshot, bytes: usize) -> Self {
        Self {
            bytes: bytes as u64,
            ledger_count: snapshot.ledger_count(),
            transaction_count: snapshot.transaction_count(),
            snapshot_time: snapshot.created_at,
            completed_at: now_millis(),
        }
    }
}

/// Backup and remote synchronization engine.
pub struct SyncOrchestrator {
    config: EngineConfig,
    data: DataDir,
    codec: SnapshotCodec,
    store: SnapshotStore,
    descriptors: DescriptorFile,
    http: Arc<dyn DavClient>,
    stager: Stager,
    status: StatusCell,
}

impl SyncOrchestrator {
    /// Opens an engine with the production HTTP client and file system.
    ///
    /// Recovers an apply interrupted by a previous crash before returning.
    pub fn open(config: EngineConfig) -> SyncResult<Self> {
        let http = HttpDavClient::with_timeouts(config.connect_timeout, config.request_timeout)?;
        Self::with_parts(config, Arc::new(http), Arc::new(StdTreeOps))
    }

    /// Opens an engine with explicit transport and file-system bindings.
    pub fn with_parts(
        config: EngineConfig,
        http: Arc<dyn DavClient>,
        ops: Arc<dyn TreeOps>,
    ) -> SyncResult<Self> {
        let data = DataDir::open(config.data_dir(), config.format_version)?;
        let identity = Arc::new(DeviceIdentity::new(config.device_id_path()));
        let codec = SnapshotCodec::new(identity);
        let store = SnapshotStore::new(
            config.snapshot_dir(),
            codec.clone(),
            RetentionPolicy::keep(config.keep_count),
        );
        let stager = Stager::new(config.data_dir(), config.staging_dir(), ops);

        match stager.recover()? {
            RecoveryOutcome::Clean => {}
            outcome => warn!(?outcome, "previous apply was interrupted"),
        }

        Ok(Self {
            descriptors: DescriptorFile::new(config.descriptor_path()),
            config,
            data,
            codec,
            store,
            http,
            stager,
            status: StatusCell::new(),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the live data directory.
    #[must_use]
    pub fn data(&self) -> &DataDir {
        &self.data
    }

    /// Returns the local snapshot store.
    #[must_use]
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.status.current()
    }

    /// Returns a receiver notified on every status transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Requests cancellation of the running operation.
    ///
    /// Has no effect once local data is being swapped.
    pub fn cancel(&self) {
        self.status.cancel();
    }

    /// Returns this installation's device id.
    pub fn device_id(&self) -> SyncResult<String> {
        Ok(self.codec.identity().get_or_create()?)
    }

    /// Returns the advisory content fingerprint of the live data.
    pub fn fingerprint(&self) -> SyncResult<String> {
        Ok(self.codec.fingerprint(&self.data)?)
    }

    // ------------------------------------------------------------------
    // Remote settings
    // ------------------------------------------------------------------

    /// Returns the stored remote descriptor, if any.
    pub fn remote_descriptor(&self) -> SyncResult<Option<RemoteSyncDescriptor>> {
        self.descriptors.load()
    }

    /// Stores a remote descriptor, keeping the recorded sync time.
    pub fn configure_remote(&self, mut descriptor: RemoteSyncDescriptor) -> SyncResult<()> {
        if descriptor.last_sync_time.is_none() {
            descriptor.last_sync_time = self
                .descriptors
                .load()
                .ok()
                .flatten()
                .and_then(|d| d.last_sync_time);
        }
        self.descriptors.save(&descriptor)?;
        info!(
            endpoint = %descriptor.endpoint_url,
            enabled = descriptor.enabled,
            "remote configured"
        );
        Ok(())
    }

    fn remote_for(
        &self,
        descriptor: &RemoteSyncDescriptor,
    ) -> SyncResult<WebDavClient<Arc<dyn DavClient>>> {
        Ok(WebDavClient::new(
            descriptor.endpoint_url.as_str(),
            &descriptor.username,
            &descriptor.secret,
            Arc::clone(&self.http),
        )?)
    }

    /// Checks that `descriptor` reaches an endpoint that accepts its credentials.
    pub fn test_remote_connection(&self, descriptor: &RemoteSyncDescriptor) -> SyncResult<()> {
        descriptor.validate()?;
        let remote = self.remote_for(descriptor)?;
        remote.probe("")?;
        info!(endpoint = %descriptor.endpoint_url, "remote connection ok");
        Ok(())
    }

    /// Reads the metadata of the remote snapshot, if one was pushed.
    pub fn get_remote_sync_info(&self) -> SyncResult<Option<RemoteSyncMeta>> {
        let descriptor = self.descriptors.require()?;
        let remote = self.remote_for(&descriptor)?;
        match remote.get(&self.config.remote_meta_path()) {
            Ok(bytes) => Ok(Some(RemoteSyncMeta::from_json(&bytes)?)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    // ------------------------------------------------------------------
    // Push / pull
    // ------------------------------------------------------------------

    /// Uploads the current state as the remote snapshot.
    pub fn push(&self) -> SyncResult<SyncReport> {
        let guard = self.status.begin(SyncStatus::Uploading)?;
        let result = self.push_inner(&guard);
        log_outcome("push", &result);
        guard.finish(result)
    }

    fn push_inner(&self, guard: &OperationGuard<'_>) -> SyncResult<SyncReport> {
        let descriptor = self.descriptors.require()?;
        let remote = self.remote_for(&descriptor)?;

        let sync_root = self.config.sync_root.trim_matches('/');
        if !sync_root.is_empty() && !remote.exists(sync_root) {
            remote.ensure_parents(sync_root)?;
            remote.make_collection(sync_root)?;
        }

        // The revision stamps the archive, so unchanged data uploads identical bytes.
        let revision = self.data.revision()?;
        let snapshot = self.codec.encode_at(&self.data, revision)?;
        let archive = self.codec.to_bytes(&snapshot, SnapshotFormat::Archive)?;
        let report = SyncReport::new(&snapshot, archive.len());
        guard.check_cancelled()?;

        remote.put(
            &self.config.remote_archive_path(),
            archive,
            ARCHIVE_CONTENT_TYPE,
        )?;

        let now = now_millis();
        let meta = RemoteSyncMeta {
            last_sync_time: now,
            device_id: snapshot.origin_device_id.clone(),
            version: snapshot.format_version,
        };
        remote.put(
            &self.config.remote_meta_path(),
            meta.to_json()?,
            META_CONTENT_TYPE,
        )?;

        if let Err(err) = self.descriptors.record_sync(now) {
            warn!(error = %err, "failed to record last sync time");
        }
        Ok(report)
    }

    /// Replaces local data with the remote snapshot.
    pub fn pull(&self) -> SyncResult<SyncReport> {
        let guard = self.status.begin(SyncStatus::Downloading)?;
        let result = self.pull_inner(&guard);
        log_outcome("pull", &result);
        guard.finish(result)
    }

    fn pull_inner(&self, guard: &OperationGuard<'_>) -> SyncResult<SyncReport> {
        let descriptor = self.descriptors.require()?;
        let remote = self.remote_for(&descriptor)?;
        let archive_path = self.config.remote_archive_path();

        match remote.probe(&archive_path) {
            Ok(()) => {}
            Err(err) if err.is_not_found() => return Err(SyncError::NoRemoteData),
            Err(err) => return Err(err.into()),
        }
        guard.check_cancelled()?;

        let bytes = match remote.get(&archive_path) {
            Ok(bytes) => bytes,
            Err(err) if err.is_not_found() => return Err(SyncError::NoRemoteData),
            Err(err) => return Err(err.into()),
        };
        guard.check_cancelled()?;

        let snapshot = self.codec.decode(&bytes)?;
        self.apply(guard, &snapshot)?;

        // Local data is already replaced; only the timestamp is lost.
        let report = SyncReport::new(&snapshot, bytes.len());
        if let Err(err) = self.descriptors.record_sync(report.completed_at) {
            warn!(error = %err, "failed to record last sync time");
        }
        Ok(report)
    }

    /// Replaces local data with a stored local snapshot.
    pub fn restore_from_local_snapshot(&self, name: &str) -> SyncResult<SyncReport> {
        let guard = self.status.begin(SyncStatus::Staging)?;
        let result = self.restore_inner(&guard, name);
        log_outcome("restore", &result);
        guard.finish(result)
    }

    fn restore_inner(&self, guard: &OperationGuard<'_>, name: &str) -> SyncResult<SyncReport> {
        let bytes = self.store.read(name)?;
        let snapshot = self.codec.decode(&bytes)?;
        self.apply(guard, &snapshot)?;
        Ok(SyncReport::new(&snapshot, bytes.len()))
    }

    /// Stages, verifies and swaps `snapshot` into the data directory.
    fn apply(&self, guard: &OperationGuard<'_>, snapshot: &Snapshot) -> SyncResult<()> {
        guard.advance(SyncStatus::Staging);
        let mut staged = self.stager.begin()?;

        let prepared = guard
            .check_cancelled()
            .and_then(|()| staged.extract(snapshot))
            .and_then(|()| guard.check_cancelled());
        if let Err(err) = prepared {
            staged.discard();
            return Err(err);
        }

        guard.advance(SyncStatus::Swapping);
        let _exclusive = self.data.lock_exclusive();
        if let Err(err) = staged.swap() {
            if let Err(rollback_err) = staged.rollback() {
                error!(
                    error = %rollback_err,
                    "rollback failed; the next apply or start will retry it"
                );
            }
            return Err(err);
        }
        staged.commit();

        info!(
            origin = %snapshot.origin_device_id,
            created_at = snapshot.created_at,
            records = snapshot.entities.total(),
            "snapshot applied"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Local snapshots
    // ------------------------------------------------------------------

    /// Captures the current state into the local store.
    pub fn create_local_snapshot(&self) -> SyncResult<SnapshotMetadata> {
        Ok(self.store.create(&self.data)?)
    }

    /// Lists local snapshots, newest first. Never fails.
    #[must_use]
    pub fn list_local_snapshots(&self) -> Vec<SnapshotMetadata> {
        self.store.list()
    }

    /// Deletes a local snapshot. Returns false if it did not exist.
    pub fn delete_local_snapshot(&self, name: &str) -> SyncResult<bool> {
        Ok(self.store.delete(name)?)
    }

    /// Copies a local snapshot to `dest_dir` and returns the written path.
    pub fn export_snapshot(
        &self,
        name: &str,
        dest_dir: &Path,
        format: SnapshotFormat,
    ) -> SyncResult<PathBuf> {
        Ok(self.store.export(name, dest_dir, format)?)
    }

    /// Validates externally supplied bytes and adds them to the local store.
    pub fn import_snapshot(&self, bytes: &[u8]) -> SyncResult<SnapshotMetadata> {
        Ok(self.store.import(bytes)?)
    }
}

fn log_outcome<T>(operation: &str, result: &SyncResult<T>) {
    match result {
        Ok(_) => info!(operation, "sync operation completed"),
        Err(SyncError::SyncInProgress) => {}
        Err(err) if err.is_retryable() => {
            warn!(operation, kind = %err.kind(), error = %err, "sync operation failed");
        }
        Err(err) => {
            info!(operation, kind = %err.kind(), error = %err, "sync operation did not complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgervault_snapshot::{Collection, EntitySource, Record};
    use ledgervault_webdav::{DavRequest, DavResponse};
    use serde_json::json;
    use tempfile::tempdir;

    /// Transport that must never be reached.
    struct Unreachable;

    impl DavClient for Unreachable {
        fn send(&self, request: DavRequest) -> Result<DavResponse, String> {
            panic!("unexpected request: {request:?}");
        }
    }

    fn engine(root: &Path) -> SyncOrchestrator {
        SyncOrchestrator::with_parts(
            EngineConfig::new(root),
            Arc::new(Unreachable),
            Arc::new(StdTreeOps),
        )
        .unwrap()
    }

    #[test]
    fn push_without_descriptor_makes_no_requests() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        assert!(matches!(engine.push(), Err(SyncError::NotConfigured { .. })));
        assert!(matches!(engine.pull(), Err(SyncError::NotConfigured { .. })));
        assert!(matches!(engine.status(), SyncStatus::Failed { .. }));
    }

    #[test]
    fn disabled_descriptor_is_not_configured() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        let mut descriptor = RemoteSyncDescriptor::new("https://h/dav", "u", "p");
        descriptor.enabled = false;
        engine.configure_remote(descriptor).unwrap();

        assert!(matches!(engine.push(), Err(SyncError::NotConfigured { .. })));
        assert!(matches!(
            engine.get_remote_sync_info(),
            Err(SyncError::NotConfigured { .. })
        ));
    }

    #[test]
    fn local_restore_round_trip() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        engine
            .data()
            .replace_all(Collection::Ledgers, &[Record::new("L1", json!({}))])
            .unwrap();
        let saved = engine.create_local_snapshot().unwrap();

        engine
            .data()
            .replace_all(Collection::Ledgers, &[Record::new("L2", json!({}))])
            .unwrap();
        let report = engine.restore_from_local_snapshot(&saved.name).unwrap();

        assert_eq!(report.ledger_count, 1);
        let ledgers = engine.data().read_collection(Collection::Ledgers).unwrap();
        assert_eq!(ledgers[0].id, "L1");
        assert_eq!(engine.status(), SyncStatus::Idle);
    }

    #[test]
    fn restore_of_missing_snapshot() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        let err = engine
            .restore_from_local_snapshot("snapshot-20260101-000000-000.lvsnap")
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[test]
    fn configure_keeps_last_sync_time() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        engine
            .configure_remote(RemoteSyncDescriptor::new("https://a/dav", "u", "p"))
            .unwrap();
        engine.descriptors.record_sync(77).unwrap();

        engine
            .configure_remote(RemoteSyncDescriptor::new("https://b/dav", "u", "p2"))
            .unwrap();
        let stored = engine.remote_descriptor().unwrap().unwrap();
        assert_eq!(stored.endpoint_url, "https://b/dav");
        assert_eq!(stored.last_sync_time, Some(77));
    }
}
