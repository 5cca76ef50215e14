//! Error types for snapshot operations.

use std::io;
use thiserror::Error;

/// Result type for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Errors that can occur while encoding, decoding or storing snapshots.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The byte buffer is not a valid snapshot archive or document.
    #[error("corrupt snapshot: {message}")]
    CorruptSnapshot {
        /// Description of what failed to parse.
        message: String,
    },

    /// A named snapshot or data file does not exist.
    #[error("not found: {name}")]
    NotFound {
        /// Name of the missing resource.
        name: String,
    },

    /// A snapshot name does not follow the store's naming convention.
    #[error("invalid snapshot name: {name}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// Serializing records failed.
    #[error("encoding failed: {message}")]
    Encoding {
        /// Description of the failure.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SnapshotError {
    /// Creates a corrupt-snapshot error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptSnapshot {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Creates an encoding error.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Returns true if this error means the input bytes were unreadable.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, SnapshotError::CorruptSnapshot { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SnapshotError::corrupt("bad magic");
        assert_eq!(err.to_string(), "corrupt snapshot: bad magic");
        assert!(err.is_corrupt());

        let err = SnapshotError::not_found("snapshot-x.lvsnap");
        assert!(err.to_string().contains("snapshot-x.lvsnap"));
        assert!(!err.is_corrupt());
    }

    #[test]
    fn io_errors_convert() {
        let io = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err: SnapshotError = io.into();
        assert!(matches!(err, SnapshotError::Io(_)));
    }
}
