//! File-system fault injection for the apply protocol.
//!
//! [`FailingTreeOps`] wraps the real file system and fails selected
//! operations, which lets tests interrupt an apply at a precise step.

use ledgervault_sync::{StdTreeOps, TreeOps};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// [`TreeOps`] that fails on demand.
#[derive(Debug)]
pub struct FailingTreeOps {
    fail_rename_at: AtomicUsize,
    renames: AtomicUsize,
    fail_copy_at: AtomicUsize,
    copies: AtomicUsize,
}

impl FailingTreeOps {
    /// Creates a wrapper that fails nothing.
    pub fn new() -> Self {
        Self {
            fail_rename_at: AtomicUsize::new(usize::MAX),
            renames: AtomicUsize::new(0),
            fail_copy_at: AtomicUsize::new(usize::MAX),
            copies: AtomicUsize::new(0),
        }
    }

    /// Fails the `n`th rename from now on (1-based).
    pub fn fail_rename_at(&self, n: usize) {
        self.renames.store(0, Ordering::SeqCst);
        self.fail_rename_at.store(n, Ordering::SeqCst);
    }

    /// Fails the `n`th tree copy from now on (1-based).
    ///
    /// The first copy of an apply is the rollback copy; the second is the
    /// restore during a rollback.
    pub fn fail_copy_at(&self, n: usize) {
        self.copies.store(0, Ordering::SeqCst);
        self.fail_copy_at.store(n, Ordering::SeqCst);
    }

    /// Returns the number of renames seen since the last arm.
    pub fn renames(&self) -> usize {
        self.renames.load(Ordering::SeqCst)
    }

    /// Stops injecting failures.
    pub fn reset(&self) {
        self.fail_rename_at.store(usize::MAX, Ordering::SeqCst);
        self.renames.store(0, Ordering::SeqCst);
        self.fail_copy_at.store(usize::MAX, Ordering::SeqCst);
        self.copies.store(0, Ordering::SeqCst);
    }
}

impl Default for FailingTreeOps {
    fn default() -> Self {
        Self::new()
    }
}

fn injected(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("injected {what} failure"))
}

impl TreeOps for FailingTreeOps {
    fn copy_tree(&self, from: &Path, to: &Path) -> io::Result<()> {
        let seen = self.copies.fetch_add(1, Ordering::SeqCst) + 1;
        if seen == self.fail_copy_at.load(Ordering::SeqCst) {
            return Err(injected("copy"));
        }
        StdTreeOps.copy_tree(from, to)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let seen = self.renames.fetch_add(1, Ordering::SeqCst) + 1;
        if seen == self.fail_rename_at.load(Ordering::SeqCst) {
            return Err(injected("rename"));
        }
        StdTreeOps.rename(from, to)
    }

    fn remove_tree(&self, path: &Path) -> io::Result<()> {
        StdTreeOps.remove_tree(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        StdTreeOps.create_dir_all(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fails_only_the_armed_rename() {
        let dir = tempdir().unwrap();
        let (a, b, c) = (dir.path().join("a"), dir.path().join("b"), dir.path().join("c"));
        std::fs::create_dir(&a).unwrap();

        let ops = FailingTreeOps::new();
        ops.fail_rename_at(2);
        ops.rename(&a, &b).unwrap();
        assert!(ops.rename(&b, &c).is_err());
        ops.rename(&b, &c).unwrap();
        assert!(c.exists());
        assert_eq!(ops.renames(), 3);
    }

    #[test]
    fn fails_only_the_armed_copy() {
        let (src, dst) = (tempdir().unwrap(), tempdir().unwrap());
        std::fs::write(src.path().join("f"), b"x").unwrap();
        let target = dst.path().join("copy");

        let ops = FailingTreeOps::new();
        ops.fail_copy_at(1);
        assert!(ops.copy_tree(src.path(), &target).is_err());
        ops.copy_tree(src.path(), &target).unwrap();
        assert!(target.join("f").exists());
    }
}
