//! Crash-safe file helpers.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Writes `data` to `path` so that readers only ever see the complete file.
///
/// Uses the write-then-rename pattern:
/// 1. Write to a hidden temporary sibling
/// 2. Sync the temporary file to disk
/// 3. Rename it over the final name
/// 4. Fsync the parent directory so the rename is durable
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let temp_path = temp_sibling(path);

    let result = (|| {
        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, path)
    })();

    if let Err(err) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }

    if let Some(parent) = path.parent() {
        sync_dir(parent)?;
    }
    Ok(())
}

/// Returns the temporary name used while `path` is being written.
pub fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// Fsyncs a directory so that entry creations, renames and deletions are durable.
///
/// Windows NTFS journals metadata operations and does not support opening a
/// directory for sync, so this is a no-op there.
#[cfg(unix)]
pub fn sync_dir(path: &Path) -> io::Result<()> {
    let dir = File::open(path)?;
    dir.sync_all()
}

/// Fsyncs a directory (no-op on this platform).
#[cfg(not(unix))]
pub fn sync_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn atomic_write_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("STATE");

        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert!(!temp_sibling(&path).exists());
    }

    #[test]
    fn temp_sibling_is_hidden() {
        let path = Path::new("/data/snapshots/snapshot-1.lvsnap");
        assert_eq!(
            temp_sibling(path),
            Path::new("/data/snapshots/.snapshot-1.lvsnap.tmp")
        );
    }

    #[test]
    fn atomic_write_fails_without_parent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("file");
        assert!(atomic_write(&path, b"x").is_err());
    }
}
