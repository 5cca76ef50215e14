//! Engine configuration and persisted remote settings.

use crate::error::{SyncError, SyncResult};
use ledgervault_snapshot::fsutil::atomic_write;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Configuration of a sync engine instance.
///
/// Everything the engine persists lives under `root`:
///
/// ```text
/// <root>/
/// ├─ data/          live collections
/// ├─ snapshots/     local snapshot store
/// ├─ .staging/      rollback copies and extraction during an apply
/// ├─ device-id
/// └─ remote.json    remote sync descriptor
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Root directory of all engine state.
    pub root: PathBuf,
    /// Number of local snapshots to keep.
    pub keep_count: usize,
    /// Remote collection holding the synced snapshot.
    pub sync_root: String,
    /// File name of the remote archive.
    pub archive_name: String,
    /// File name of the remote metadata document.
    pub meta_name: String,
    /// Connect timeout for remote requests.
    pub connect_timeout: Duration,
    /// Whole-request timeout for remote requests.
    pub request_timeout: Duration,
    /// Schema version reported for data without a state file.
    pub format_version: u32,
}

impl EngineConfig {
    /// Creates a configuration rooted at `root` with default settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            keep_count: 5,
            sync_root: "LedgerVault/sync".to_string(),
            archive_name: "data.lvsnap".to_string(),
            meta_name: "meta.json".to_string(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            format_version: 1,
        }
    }

    /// Sets how many local snapshots are kept.
    #[must_use]
    pub fn with_keep_count(mut self, keep_count: usize) -> Self {
        self.keep_count = keep_count;
        self
    }

    /// Sets the remote sync collection.
    #[must_use]
    pub fn with_sync_root(mut self, sync_root: impl Into<String>) -> Self {
        self.sync_root = sync_root.into();
        self
    }

    /// Sets the remote archive file name.
    #[must_use]
    pub fn with_archive_name(mut self, name: impl Into<String>) -> Self {
        self.archive_name = name.into();
        self
    }

    /// Sets the remote metadata file name.
    #[must_use]
    pub fn with_meta_name(mut self, name: impl Into<String>) -> Self {
        self.meta_name = name.into();
        self
    }

    /// Sets the connect and request timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    /// Sets the default schema version.
    #[must_use]
    pub fn with_format_version(mut self, version: u32) -> Self {
        self.format_version = version;
        self
    }

    /// Live data directory.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    /// Local snapshot directory.
    #[must_use]
    pub fn snapshot_dir(&self) -> PathBuf {
        self.root.join("snapshots")
    }

    /// Staging area used during an apply.
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(".staging")
    }

    /// Device id file.
    #[must_use]
    pub fn device_id_path(&self) -> PathBuf {
        self.root.join("device-id")
    }

    /// Remote descriptor file.
    #[must_use]
    pub fn descriptor_path(&self) -> PathBuf {
        self.root.join("remote.json")
    }

    /// Remote path of the archive.
    #[must_use]
    pub fn remote_archive_path(&self) -> String {
        remote_join(&self.sync_root, &self.archive_name)
    }

    /// Remote path of the metadata document.
    #[must_use]
    pub fn remote_meta_path(&self) -> String {
        remote_join(&self.sync_root, &self.meta_name)
    }
}

fn remote_join(root: &str, name: &str) -> String {
    let root = root.trim_matches('/');
    if root.is_empty() {
        name.to_string()
    } else {
        format!("{root}/{name}")
    }
}

/// Persisted remote connection settings.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSyncDescriptor {
    /// Whether remote sync is switched on.
    #[serde(default)]
    pub enabled: bool,
    /// WebDAV endpoint root.
    #[serde(default)]
    pub endpoint_url: String,
    /// Basic Auth user name.
    #[serde(default)]
    pub username: String,
    /// Basic Auth password or app token.
    #[serde(default)]
    pub secret: String,
    /// Time of the last successful push or pull (Unix milliseconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<u64>,
}

impl RemoteSyncDescriptor {
    /// Creates an enabled descriptor.
    pub fn new(
        endpoint_url: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            enabled: true,
            endpoint_url: endpoint_url.into(),
            username: username.into(),
            secret: secret.into(),
            last_sync_time: None,
        }
    }

    /// Fails with `NotConfigured` unless the descriptor is usable.
    pub fn validate(&self) -> SyncResult<()> {
        if !self.enabled {
            return Err(SyncError::not_configured("remote sync is disabled"));
        }
        let missing: Vec<&str> = [
            ("endpoint URL", &self.endpoint_url),
            ("username", &self.username),
            ("secret", &self.secret),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(SyncError::not_configured(format!(
                "missing {}",
                missing.join(", ")
            )))
        }
    }
}

impl fmt::Debug for RemoteSyncDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSyncDescriptor")
            .field("enabled", &self.enabled)
            .field("endpoint_url", &self.endpoint_url)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("last_sync_time", &self.last_sync_time)
            .finish()
    }
}

/// JSON file holding the [`RemoteSyncDescriptor`].
#[derive(Debug, Clone)]
pub struct DescriptorFile {
    path: PathBuf,
}

impl DescriptorFile {
    /// Creates a handle for the descriptor at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the descriptor. A missing file means "not configured".
    pub fn load(&self) -> SyncResult<Option<RemoteSyncDescriptor>> {
        match fs::read(&self.path) {
            Ok(data) => serde_json::from_slice(&data).map(Some).map_err(|e| {
                SyncError::not_configured(format!("unreadable {}: {e}", self.path.display()))
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(SyncError::staging_io(self.path.display(), &err)),
        }
    }

    /// Loads and validates the descriptor.
    pub fn require(&self) -> SyncResult<RemoteSyncDescriptor> {
        let descriptor = self
            .load()?
            .ok_or_else(|| SyncError::not_configured("no remote configured"))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Persists the descriptor atomically.
    pub fn save(&self, descriptor: &RemoteSyncDescriptor) -> SyncResult<()> {
        let data = serde_json::to_vec_pretty(descriptor)
            .map_err(|e| SyncError::staging(format!("descriptor encoding failed: {e}")))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::staging_io(parent.display(), &e))?;
        }
        atomic_write(&self.path, &data).map_err(|e| SyncError::staging_io(self.path.display(), &e))
    }

    /// Records a successful sync time, leaving all other fields untouched.
    pub fn record_sync(&self, time: u64) -> SyncResult<()> {
        let mut descriptor = self.load()?.unwrap_or_default();
        descriptor.last_sync_time = Some(time);
        self.save(&descriptor)?;
        debug!(last_sync_time = time, "recorded sync time");
        Ok(())
    }
}
