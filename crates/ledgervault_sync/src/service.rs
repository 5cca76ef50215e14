//! Async facade over the orchestrator.
//!
//! Every operation is network- or disk-bound and blocking, so each call runs
//! on tokio's blocking pool. Awaiting a call never stalls an executor thread.

use crate::config::RemoteSyncDescriptor;
use crate::error::{SyncError, SyncResult};
use crate::meta::RemoteSyncMeta;
use crate::orchestrator::{SyncOrchestrator, SyncReport};
use crate::state::SyncStatus;
use ledgervault_snapshot::{SnapshotFormat, SnapshotMetadata};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable async handle on a [`SyncOrchestrator`].
#[derive(Clone)]
pub struct SyncService {
    inner: Arc<SyncOrchestrator>,
}

impl SyncService {
    /// Wraps an orchestrator.
    pub fn new(orchestrator: SyncOrchestrator) -> Self {
        Self {
            inner: Arc::new(orchestrator),
        }
    }

    /// Returns the wrapped orchestrator.
    #[must_use]
    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.inner
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.inner.status()
    }

    /// Returns a receiver notified on every status transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.subscribe()
    }

    /// Requests cancellation of the running operation.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    async fn run<T, F>(&self, f: F) -> SyncResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&SyncOrchestrator) -> SyncResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| SyncError::staging(format!("background task failed: {e}")))?
    }

    /// See [`SyncOrchestrator::push`].
    pub async fn push(&self) -> SyncResult<SyncReport> {
        self.run(SyncOrchestrator::push).await
    }

    /// See [`SyncOrchestrator::pull`].
    pub async fn pull(&self) -> SyncResult<SyncReport> {
        self.run(SyncOrchestrator::pull).await
    }

    /// See [`SyncOrchestrator::test_remote_connection`].
    pub async fn test_remote_connection(&self, descriptor: RemoteSyncDescriptor) -> SyncResult<()> {
        self.run(move |o| o.test_remote_connection(&descriptor))
            .await
    }

    /// See [`SyncOrchestrator::get_remote_sync_info`].
    pub async fn get_remote_sync_info(&self) -> SyncResult<Option<RemoteSyncMeta>> {
        self.run(SyncOrchestrator::get_remote_sync_info).await
    }

    /// See [`SyncOrchestrator::create_local_snapshot`].
    pub async fn create_local_snapshot(&self) -> SyncResult<SnapshotMetadata> {
        self.run(SyncOrchestrator::create_local_snapshot).await
    }

    /// See [`SyncOrchestrator::list_local_snapshots`].
    pub async fn list_local_snapshots(&self) -> SyncResult<Vec<SnapshotMetadata>> {
        self.run(|o| Ok(o.list_local_snapshots())).await
    }

    /// See [`SyncOrchestrator::delete_local_snapshot`].
    pub async fn delete_local_snapshot(&self, name: String) -> SyncResult<bool> {
        self.run(move |o| o.delete_local_snapshot(&name)).await
    }

    /// See [`SyncOrchestrator::restore_from_local_snapshot`].
    pub async fn restore_from_local_snapshot(&self, name: String) -> SyncResult<SyncReport> {
        self.run(move |o| o.restore_from_local_snapshot(&name))
            .await
    }

    /// See [`SyncOrchestrator::export_snapshot`].
    pub async fn export_snapshot(
        &self,
        name: String,
        dest_dir: PathBuf,
        format: SnapshotFormat,
    ) -> SyncResult<PathBuf> {
        self.run(move |o| o.export_snapshot(&name, &dest_dir, format))
            .await
    }

    /// See [`SyncOrchestrator::import_snapshot`].
    pub async fn import_snapshot(&self, bytes: Vec<u8>) -> SyncResult<SnapshotMetadata> {
        self.run(move |o| o.import_snapshot(&bytes)).await
    }

    /// See [`SyncOrchestrator::fingerprint`].
    pub async fn fingerprint(&self) -> SyncResult<String> {
        self.run(SyncOrchestrator::fingerprint).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::staging::StdTreeOps;
    use ledgervault_snapshot::{Collection, EntitySource, Record};
    use ledgervault_webdav::{DavClient, DavRequest, DavResponse};
    use serde_json::json;
    use tempfile::tempdir;

    struct Offline;

    impl DavClient for Offline {
        fn send(&self, _request: DavRequest) -> Result<DavResponse, String> {
            Err("network unreachable".to_string())
        }
    }

    fn service(root: &std::path::Path) -> SyncService {
        let orchestrator = SyncOrchestrator::with_parts(
            EngineConfig::new(root),
            Arc::new(Offline),
            Arc::new(StdTreeOps),
        )
        .unwrap();
        SyncService::new(orchestrator)
    }

    #[tokio::test]
    async fn local_snapshots_through_service() {
        let dir = tempdir().unwrap();
        let service = service(dir.path());
        service
            .orchestrator()
            .data()
            .replace_all(Collection::Ledgers, &[Record::new("L1", json!({"name": "cash"}))])
            .unwrap();

        let created = service.create_local_snapshot().await.unwrap();
        let listed = service.list_local_snapshots().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, created.name);

        assert!(service.delete_local_snapshot(created.name).await.unwrap());
        assert!(service.list_local_snapshots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_surfaces_as_error() {
        let dir = tempdir().unwrap();
        let service = service(dir.path());
        service
            .orchestrator()
            .configure_remote(RemoteSyncDescriptor::new("https://dav.example/dav", "u", "p"))
            .unwrap();

        let err = service.pull().await.unwrap_err();
        assert!(matches!(err, SyncError::Transport { status: None, .. }));
        assert!(matches!(service.status(), SyncStatus::Failed { .. }));
    }
}
