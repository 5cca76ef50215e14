//! Per-install device identity.
//!
//! The identifier is created lazily on first use, persisted next to the
//! application data and cached for the lifetime of the provider.

use crate::error::SnapshotResult;
use crate::fsutil::atomic_write;
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Lazily initialized, stable identifier of this install.
#[derive(Debug)]
pub struct DeviceIdentity {
    /// File holding the persisted id, if any.
    path: Option<PathBuf>,
    /// Cached id once known.
    cached: Mutex<Option<String>>,
}

impl DeviceIdentity {
    /// Creates a provider backed by the given file.
    ///
    /// Nothing is read or written until [`DeviceIdentity::get_or_create`] is called.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            cached: Mutex::new(None),
        }
    }

    /// Creates a provider with a fixed id and no backing file.
    pub fn fixed(id: impl Into<String>) -> Self {
        Self {
            path: None,
            cached: Mutex::new(Some(id.into())),
        }
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the device id, generating and persisting one if absent.
    pub fn get_or_create(&self) -> SnapshotResult<String> {
        let mut cached = self.cached.lock();
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let id = match &self.path {
            Some(path) => load_or_generate(path)?,
            None => Uuid::new_v4().to_string(),
        };
        *cached = Some(id.clone());
        Ok(id)
    }
}

fn load_or_generate(path: &Path) -> SnapshotResult<String> {
    match fs::read_to_string(path) {
        Ok(content) if !content.trim().is_empty() => return Ok(content.trim().to_string()),
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let id = Uuid::new_v4().to_string();
    atomic_write(path, id.as_bytes())?;
    info!(device_id = %id, "generated new device id");
    Ok(id)
}
