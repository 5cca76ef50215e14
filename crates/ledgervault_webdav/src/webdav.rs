//! WebDAV operations over a [`DavClient`].
//!
//! All paths are relative to the endpoint root. Every request carries an
//! HTTP Basic `Authorization` header built from the configured credentials.

use crate::client::{DavClient, DavMethod, DavRequest, DavResponse};
use crate::error::{DavError, DavResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;
use tracing::debug;

/// Body of the zero-depth property query.
const PROPFIND_BODY: &str = concat!(
    r#"<?xml version="1.0" encoding="utf-8"?>"#,
    r#"<d:propfind xmlns:d="DAV:"><d:prop><d:resourcetype/></d:prop></d:propfind>"#
);

/// HTTP 207 Multi-Status.
const MULTI_STATUS: u16 = 207;

/// Minimal WebDAV client scoped to what remote sync needs.
pub struct WebDavClient<C: DavClient> {
    /// Endpoint root without trailing slash.
    endpoint: String,
    /// Precomputed `Authorization` header value.
    authorization: String,
    /// HTTP client implementation.
    client: C,
}

impl<C: DavClient> WebDavClient<C> {
    /// Creates a client for `endpoint` authenticating as `username`.
    ///
    /// Fails if the endpoint is not an absolute http(s) URL.
    pub fn new(
        endpoint: impl Into<String>,
        username: &str,
        secret: &str,
        client: C,
    ) -> DavResult<Self> {
        let endpoint = endpoint.into();
        let trimmed = endpoint.trim();
        let has_scheme = trimmed.starts_with("http://") || trimmed.starts_with("https://");
        let has_host = trimmed
            .split_once("://")
            .is_some_and(|(_, rest)| !rest.trim_start_matches('/').is_empty());
        if !has_scheme || !has_host {
            return Err(DavError::InvalidEndpoint(endpoint));
        }

        let credentials = STANDARD.encode(format!("{username}:{secret}"));
        Ok(Self {
            endpoint: trimmed.trim_end_matches('/').to_string(),
            authorization: format!("Basic {credentials}"),
            client,
        })
    }

    /// Returns the endpoint root.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the underlying HTTP client.
    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Builds the absolute URL of a relative path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        let encoded: Vec<String> = segments(path).map(encode_segment).collect();
        if encoded.is_empty() {
            format!("{}/", self.endpoint)
        } else {
            format!("{}/{}", self.endpoint, encoded.join("/"))
        }
    }

    fn request(&self, method: DavMethod, path: &str) -> DavRequest {
        DavRequest::new(method, self.url(path))
            .header("Authorization", self.authorization.clone())
    }

    fn send(&self, request: DavRequest) -> DavResult<DavResponse> {
        let method = request.method;
        let url = request.url.clone();
        let response = self.client.send(request).map_err(|e| {
            debug!(%method, %url, error = %e, "request failed without response");
            DavError::network(e)
        })?;
        debug!(%method, %url, status = response.status, "request completed");
        Ok(response)
    }

    fn propfind(&self, path: &str) -> DavResult<DavResponse> {
        let request = self
            .request(DavMethod::Propfind, path)
            .header("Depth", "0")
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(PROPFIND_BODY.as_bytes().to_vec());
        self.send(request)
    }

    /// Returns true if `path` exists.
    ///
    /// Any failure, including a network error, reads as "does not exist".
    pub fn exists(&self, path: &str) -> bool {
        match self.propfind(path) {
            Ok(response) => response.is_success() || response.status == MULTI_STATUS,
            Err(_) => false,
        }
    }

    /// Checks that the endpoint answers a property query on `path`.
    ///
    /// Unlike [`exists`](Self::exists) this surfaces the failure, which makes
    /// it suitable for connection tests.
    pub fn probe(&self, path: &str) -> DavResult<()> {
        let response = self.propfind(path)?;
        match response.status {
            s if (200..300).contains(&s) => Ok(()),
            401 | 403 => Err(DavError::status(response.status, "credentials rejected")),
            404 => Err(DavError::NotFound {
                path: path.to_string(),
            }),
            s => Err(DavError::status(s, format!("PROPFIND {path} failed"))),
        }
    }

    /// Creates a collection. An existing collection is not an error.
    pub fn make_collection(&self, path: &str) -> DavResult<()> {
        let response = self.send(self.request(DavMethod::Mkcol, path))?;
        match response.status {
            s if (200..300).contains(&s) => Ok(()),
            405 => Ok(()),
            s => Err(DavError::status(s, format!("MKCOL {path} failed"))),
        }
    }

    /// Creates every collection above `path`, outermost first.
    ///
    /// The last segment is not created.
    pub fn ensure_parents(&self, path: &str) -> DavResult<()> {
        let parts: Vec<&str> = segments(path).collect();
        for depth in 1..parts.len() {
            self.make_collection(&parts[..depth].join("/"))?;
        }
        Ok(())
    }

    /// Uploads `bytes` to `path`. Parent collections must already exist.
    pub fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> DavResult<()> {
        let size = bytes.len();
        let request = self
            .request(DavMethod::Put, path)
            .header("Content-Type", content_type)
            .body(bytes);
        let response = self.send(request)?;
        if response.is_success() {
            debug!(path, size, "uploaded");
            Ok(())
        } else {
            Err(DavError::status(response.status, format!("PUT {path} failed")))
        }
    }

    /// Downloads the full body of `path`.
    pub fn get(&self, path: &str) -> DavResult<Vec<u8>> {
        let response = self.send(self.request(DavMethod::Get, path))?;
        match response.status {
            s if (200..300).contains(&s) => Ok(response.body),
            404 => Err(DavError::NotFound {
                path: path.to_string(),
            }),
            s => Err(DavError::status(s, format!("GET {path} failed"))),
        }
    }

    /// Removes `path`. A missing resource is not an error.
    pub fn delete(&self, path: &str) -> DavResult<()> {
        let response = self.send(self.request(DavMethod::Delete, path))?;
        match response.status {
            s if (200..300).contains(&s) => Ok(()),
            404 => {
                debug!(path, "remote resource already gone");
                Ok(())
            }
            s => Err(DavError::status(s, format!("DELETE {path} failed"))),
        }
    }
}

impl<C: DavClient> fmt::Debug for WebDavClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebDavClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty() && *s != ".")
}

/// Percent-encodes everything outside the RFC 3986 unreserved set.
fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
