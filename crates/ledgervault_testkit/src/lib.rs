//! # LedgerVault Testkit
//!
//! Test utilities for LedgerVault sync.
//!
//! This crate provides:
//! - An in-memory WebDAV server implementing the transport's HTTP seam
//! - File-system fault injection for the apply protocol
//! - Sample data sets and engine fixtures
//! - Content checksums of directory trees
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ledgervault_testkit::prelude::*;
//!
//! let dav = MemoryDav::new();
//! let engine = TestEngine::with_dav(&dav);
//! populate(engine.data(), &sample_entities());
//! engine.push().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod checksum;
pub mod dav;
pub mod faults;
pub mod fixtures;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::checksum::*;
    pub use crate::dav::*;
    pub use crate::faults::*;
    pub use crate::fixtures::*;
}

pub use checksum::*;
pub use dav::*;
pub use faults::*;
pub use fixtures::*;
