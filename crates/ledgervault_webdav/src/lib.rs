//! # LedgerVault WebDAV
//!
//! Remote transport for LedgerVault snapshots.
//!
//! This crate provides:
//! - A minimal WebDAV client (existence check, collection creation, upload,
//!   download, delete) with HTTP Basic Auth on every request
//! - An HTTP abstraction so the transport can run against any HTTP stack
//! - A blocking `reqwest` binding with bounded timeouts
//!
//! It is not a general WebDAV library: there is no locking, no property
//! parsing and no directory listing.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod error;
mod http;
mod webdav;

pub use client::{DavClient, DavMethod, DavRequest, DavResponse};
pub use error::{DavError, DavResult};
pub use http::{HttpDavClient, DEFAULT_TIMEOUT};
pub use webdav::WebDavClient;
