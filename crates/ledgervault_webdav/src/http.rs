//! Blocking `reqwest` binding of [`DavClient`].

use crate::client::{DavClient, DavRequest, DavResponse};
use crate::error::{DavError, DavResult};
use reqwest::blocking::Client;
use reqwest::Method;
use std::time::Duration;

/// Default connect and request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// [`DavClient`] backed by a blocking `reqwest` client.
///
/// Calls block the current thread; run them on a blocking-capable thread.
#[derive(Debug, Clone)]
pub struct HttpDavClient {
    client: Client,
}

impl HttpDavClient {
    /// Creates a client with the default timeouts.
    pub fn new() -> DavResult<Self> {
        Self::with_timeouts(DEFAULT_TIMEOUT, DEFAULT_TIMEOUT)
    }

    /// Creates a client with explicit connect and whole-request timeouts.
    pub fn with_timeouts(connect: Duration, request: Duration) -> DavResult<Self> {
        let client = Client::builder()
            .connect_timeout(connect)
            .timeout(request)
            .user_agent(concat!("ledgervault/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DavError::network(format!("failed to build http client: {e}")))?;
        Ok(Self { client })
    }
}

impl DavClient for HttpDavClient {
    fn send(&self, request: DavRequest) -> Result<DavResponse, String> {
        let method = Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| format!("invalid method {}: {e}", request.method))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().map_err(|e| {
            if e.is_timeout() {
                format!("request to {} timed out", request.url)
            } else {
                format!("request to {} failed: {e}", request.url)
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| format!("reading response from {} failed: {e}", request.url))?;
        Ok(DavResponse::with_body(status, body.to_vec()))
    }
}
