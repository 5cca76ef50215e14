//! Content checksums of directory trees.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Hashes every file path and file content under `root`.
///
/// Two trees hash equal exactly when they hold the same files with the same
/// bytes. A missing root hashes like an empty one.
pub fn tree_checksum(root: &Path) -> String {
    let mut hasher = Sha256::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update([0]);
        let data = fs::read(entry.path()).expect("Failed to read file for checksum");
        hasher.update((data.len() as u64).to_le_bytes());
        hasher.update(&data);
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn detects_content_and_name_changes() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a"), b"1").unwrap();
        let first = tree_checksum(dir.path());
        assert_eq!(first, tree_checksum(dir.path()));

        fs::write(dir.path().join("a"), b"2").unwrap();
        let second = tree_checksum(dir.path());
        assert_ne!(first, second);

        fs::rename(dir.path().join("a"), dir.path().join("b")).unwrap();
        assert_ne!(second, tree_checksum(dir.path()));
    }
}
