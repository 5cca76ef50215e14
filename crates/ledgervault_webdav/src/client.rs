//! HTTP client abstraction.
//!
//! [`WebDavClient`](crate::WebDavClient) speaks WebDAV through the
//! [`DavClient`] trait, so the actual HTTP stack can be swapped out. The
//! production binding is [`HttpDavClient`](crate::HttpDavClient); tests plug
//! in an in-memory server.

use std::fmt;
use std::sync::Arc;

/// HTTP methods used by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DavMethod {
    /// Property query.
    Propfind,
    /// Collection creation.
    Mkcol,
    /// Upload.
    Put,
    /// Download.
    Get,
    /// Removal.
    Delete,
}

impl DavMethod {
    /// Returns the method name as sent on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            DavMethod::Propfind => "PROPFIND",
            DavMethod::Mkcol => "MKCOL",
            DavMethod::Put => "PUT",
            DavMethod::Get => "GET",
            DavMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for DavMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single outgoing request.
#[derive(Clone, PartialEq, Eq)]
pub struct DavRequest {
    /// Request method.
    pub method: DavMethod,
    /// Absolute URL.
    pub url: String,
    /// Request headers, in insertion order.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Vec<u8>,
}

impl DavRequest {
    /// Creates a request with no headers and an empty body.
    pub fn new(method: DavMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Returns the first header with the given name (case-insensitive).
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// Authorization carries credentials; keep it out of logs and panics.
impl fmt::Debug for DavRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(n, v)| {
                if n.eq_ignore_ascii_case("authorization") {
                    (n.as_str(), "<redacted>")
                } else {
                    (n.as_str(), v.as_str())
                }
            })
            .collect();
        f.debug_struct("DavRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// A received response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl DavResponse {
    /// Creates a response with an empty body.
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }

    /// Creates a response with a body.
    #[must_use]
    pub fn with_body(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Returns true for any 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implementations send the request as-is and return whatever the server
/// answered. Only failures that produced no response (connect errors,
/// timeouts) are reported as `Err`.
pub trait DavClient: Send + Sync {
    /// Sends a request and returns the response.
    fn send(&self, request: DavRequest) -> Result<DavResponse, String>;
}

impl<C: DavClient + ?Sized> DavClient for Arc<C> {
    fn send(&self, request: DavRequest) -> Result<DavResponse, String> {
        (**self).send(request)
    }
}

impl<C: DavClient + ?Sized> DavClient for Box<C> {
    fn send(&self, request: DavRequest) -> Result<DavResponse, String> {
        (**self).send(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let request = DavRequest::new(DavMethod::Propfind, "http://h/x").header("Depth", "0");
        assert_eq!(request.header_value("depth"), Some("0"));
        assert_eq!(request.header_value("Content-Type"), None);
    }

    #[test]
    fn debug_redacts_authorization() {
        let request =
            DavRequest::new(DavMethod::Get, "http://h/x").header("Authorization", "Basic c2VjcmV0");
        let printed = format!("{request:?}");
        assert!(!printed.contains("c2VjcmV0"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn success_range() {
        assert!(DavResponse::status(204).is_success());
        assert!(DavResponse::status(207).is_success());
        assert!(!DavResponse::status(301).is_success());
        assert!(!DavResponse::status(404).is_success());
    }
}
