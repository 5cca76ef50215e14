//! Error types for sync operations.

use ledgervault_snapshot::SnapshotError;
use ledgervault_webdav::DavError;
use std::fmt;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync, restore and snapshot operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Remote settings are missing, incomplete or disabled.
    #[error("remote sync is not configured: {reason}")]
    NotConfigured {
        /// What is missing.
        reason: String,
    },

    /// A pull found no snapshot on the remote.
    #[error("no snapshot found on the remote")]
    NoRemoteData,

    /// Another sync operation is running.
    #[error("a sync operation is already in progress")]
    SyncInProgress,

    /// Non-success HTTP outcome or network failure.
    #[error("{}", transport_message(*status, message))]
    Transport {
        /// HTTP status code, if a response was received.
        status: Option<u16>,
        /// Error message.
        message: String,
    },

    /// Bytes expected to be a snapshot did not decode.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// Local I/O failed while backing up, extracting or swapping.
    #[error("staging failed: {0}")]
    Staging(String),

    /// A requested local or remote resource is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation was cancelled before local data was touched.
    #[error("sync cancelled")]
    Cancelled,
}

fn transport_message(status: Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("transport error (HTTP {status}): {message}"),
        None => format!("transport error: {message}"),
    }
}

/// Coarse classification of a [`SyncError`] for presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`SyncError::NotConfigured`].
    NotConfigured,
    /// See [`SyncError::NoRemoteData`].
    NoRemoteData,
    /// See [`SyncError::SyncInProgress`].
    SyncInProgress,
    /// See [`SyncError::Transport`].
    Transport,
    /// See [`SyncError::CorruptSnapshot`].
    CorruptSnapshot,
    /// See [`SyncError::Staging`].
    Staging,
    /// See [`SyncError::NotFound`].
    NotFound,
    /// See [`SyncError::Cancelled`].
    Cancelled,
}

impl ErrorKind {
    /// Returns a stable snake_case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotConfigured => "not_configured",
            ErrorKind::NoRemoteData => "no_remote_data",
            ErrorKind::SyncInProgress => "sync_in_progress",
            ErrorKind::Transport => "transport",
            ErrorKind::CorruptSnapshot => "corrupt_snapshot",
            ErrorKind::Staging => "staging",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SyncError {
    /// Creates a not-configured error.
    pub fn not_configured(reason: impl Into<String>) -> Self {
        Self::NotConfigured {
            reason: reason.into(),
        }
    }

    /// Creates a staging error.
    pub fn staging(message: impl Into<String>) -> Self {
        Self::Staging(message.into())
    }

    /// Creates a staging error from an I/O failure on `what`.
    pub fn staging_io(what: impl fmt::Display, err: &std::io::Error) -> Self {
        Self::Staging(format!("{what}: {err}"))
    }

    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::NotConfigured { .. } => ErrorKind::NotConfigured,
            SyncError::NoRemoteData => ErrorKind::NoRemoteData,
            SyncError::SyncInProgress => ErrorKind::SyncInProgress,
            SyncError::Transport { .. } => ErrorKind::Transport,
            SyncError::CorruptSnapshot(_) => ErrorKind::CorruptSnapshot,
            SyncError::Staging(_) => ErrorKind::Staging,
            SyncError::NotFound(_) => ErrorKind::NotFound,
            SyncError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Returns the HTTP status code, if the error carries one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns true if the caller may simply try again.
    ///
    /// The engine itself never retries.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transport { .. } | SyncError::Staging(_))
    }
}

impl From<SnapshotError> for SyncError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::CorruptSnapshot { message } => SyncError::CorruptSnapshot(message),
            SnapshotError::NotFound { name } | SnapshotError::InvalidName { name } => {
                SyncError::NotFound(name)
            }
            SnapshotError::Encoding { message } => SyncError::Staging(message),
            SnapshotError::Io(e) => SyncError::Staging(e.to_string()),
        }
    }
}

impl From<DavError> for SyncError {
    fn from(err: DavError) -> Self {
        match err {
            DavError::Transport { status, message } => SyncError::Transport { status, message },
            DavError::NotFound { path } => SyncError::NotFound(path),
            DavError::InvalidEndpoint(endpoint) => {
                SyncError::not_configured(format!("invalid endpoint URL {endpoint:?}"))
            }
        }
    }
}
