//! Error types for the WebDAV transport.

use thiserror::Error;

/// Result type for WebDAV operations.
pub type DavResult<T> = Result<T, DavError>;

/// Errors that can occur while talking to a WebDAV endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DavError {
    /// Non-success HTTP status, timeout or network failure.
    #[error("{}", transport_message(*status, message))]
    Transport {
        /// HTTP status code, if a response was received.
        status: Option<u16>,
        /// Error message.
        message: String,
    },

    /// The remote resource does not exist.
    #[error("remote resource not found: {path}")]
    NotFound {
        /// Path relative to the endpoint root.
        path: String,
    },

    /// The endpoint URL is unusable.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

fn transport_message(status: Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("transport error (HTTP {status}): {message}"),
        None => format!("transport error: {message}"),
    }
}

impl DavError {
    /// Creates an error for an unexpected HTTP status.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Creates an error for a request that produced no response.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// Returns the HTTP status code carried by this error, if any.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            DavError::Transport { status, .. } => *status,
            DavError::NotFound { .. } => Some(404),
            DavError::InvalidEndpoint(_) => None,
        }
    }

    /// Returns true if the remote resource is absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DavError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_status() {
        let err = DavError::status(507, "insufficient storage");
        assert_eq!(
            err.to_string(),
            "transport error (HTTP 507): insufficient storage"
        );
        assert_eq!(err.status_code(), Some(507));
    }

    #[test]
    fn network_errors_have_no_status() {
        let err = DavError::network("connection refused");
        assert_eq!(err.status_code(), None);
        assert_eq!(err.to_string(), "transport error: connection refused");
    }

    #[test]
    fn not_found() {
        let err = DavError::NotFound {
            path: "sync/data.lvsnap".into(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.status_code(), Some(404));
    }
}
