//! Bronze Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
//!
//! Version-gated ingestion of public biological datasets into object
//! storage.
//!
//! Each source is resolved to a version marker, compared against the shared
//! manifest, streamed into `raw/{source}/latest/{version}/`, rotated so that
//! older versions move under `releases/`, and finally decompressed into the
//! `extracted/` mirror.
//!
//! # Source groups
//!
//! - **api**: fixed REST operations, optional version endpoint
//! - **ftp**: directory listings filtered by file rules, versioned by `MDTM`
//! - **ols**: ontologies from the OLS4 API
//! - **web**: download links scraped from HTML pages
//! - **bioportal**: BioPortal ontology submissions
//! - **custom**: dedicated flows (Pathway Commons)
//!
//! # Example
//!
//! ```no_run
//! use bronze_ingest::{pipeline, IngestConfig, IngestContext, SourceGroup, SourcesDocument};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let sources = SourcesDocument::load(&config.sources_path)?;
//!     let ctx = IngestContext::connect(config).await?;
//!     let outcome = pipeline::run_source(&ctx, &sources, SourceGroup::Ols, "efo").await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod extraction;
pub mod jobs;
pub mod manifest;
pub mod pipeline;
pub mod rotation;
pub mod sources;
pub mod storage;
pub mod transfer;
pub mod versioning;

pub use config::IngestConfig;
pub use error::{IngestError, Result};
pub use manifest::{ManifestEntry, ManifestStore};
pub use pipeline::{IngestContext, IngestOutcome, IngestionPipeline, SourcePlan};
pub use sources::{SourceGroup, SourcesDocument};
pub use storage::{BlobStore, MemoryStore, S3Store};
