//! Version resolution and gating
//!
//! A resolver turns remote content into one opaque marker string. The gate
//! compares that marker against the one stored in the manifest.

use thiserror::Error;

pub mod dates;
pub mod fetch;
pub mod gate;
pub mod json;
pub mod listing;
pub mod page;
pub mod resolver;

pub use fetch::HttpFetcher;
pub use gate::{should_ingest, GateDecision};
pub use resolver::{ResolverSpec, VersionResolver};

/// Failure to produce a remote version marker.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Expected structure, row, link or field is missing from the content.
    #[error("{0}")]
    Format(String),

    #[error("could not parse date '{value}' as '{format}'")]
    Date { value: String, format: String },

    #[error("ftp: {0}")]
    Ftp(String),
}

impl ResolveError {
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }
}
