//! Bronze Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the bronze-layer ingestion workspace.
//!
//! # Overview
//!
//! - **Logging**: tracing subscriber setup shared by every binary
//! - **Checksums**: incremental content digests computed over chunk streams
//! - **Errors**: the low-level error type used by the helpers in this crate
//!
//! # Example
//!
//! ```no_run
//! use bronze_common::checksum::{ChecksumAlgorithm, StreamingDigest};
//!
//! let mut digest = StreamingDigest::new(ChecksumAlgorithm::Sha256);
//! digest.update(b"first chunk");
//! digest.update(b"second chunk");
//! let hex = digest.finalize();
//! assert_eq!(hex.len(), 64);
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CommonError, Result};
