//! Shared ingestion manifest
//!
//! One JSON object in storage maps every source id to its last ingested
//! version, provenance and produced files. Writers read the whole document,
//! replace only their own entry and write it back. Nothing guards against two
//! sources doing that concurrently; the last writer wins.

use crate::error::{IngestError, Result};
use crate::storage::{BlobStore, StorageError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Display format of `update_ts`.
pub const UPDATE_TS_FORMAT: &str = "%Y%m%d_%H:%M:%S";

/// Whole manifest document. Entries are kept as raw JSON so that entries this
/// process does not understand survive a rewrite untouched.
pub type ManifestDocument = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub version: String,
    pub update_ts: String,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub list_of_files: Vec<String>,
    #[serde(default)]
    pub extracted: bool,
    #[serde(default)]
    pub extracted_list_of_files: Vec<String>,
}

impl ManifestEntry {
    pub fn ingested(version: impl Into<String>, at: DateTime<Utc>, hosts: Vec<String>, files: Vec<String>) -> Self {
        Self {
            version: version.into(),
            update_ts: at.format(UPDATE_TS_FORMAT).to_string(),
            hosts,
            list_of_files: files,
            extracted: false,
            extracted_list_of_files: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct ManifestStore {
    store: Arc<dyn BlobStore>,
    key: String,
}

impl ManifestStore {
    pub fn new(store: Arc<dyn BlobStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the whole document. A missing or unparsable manifest reads as empty.
    pub async fn load(&self) -> Result<ManifestDocument> {
        let raw = match self.store.get(&self.key).await {
            Ok(raw) => raw,
            Err(StorageError::NotFound(_)) => {
                info!(key = %self.key, "Manifest not found, starting empty");
                return Ok(ManifestDocument::new());
            },
            Err(e) => return Err(IngestError::Manifest(format!("reading {}: {e}", self.key))),
        };

        match serde_json::from_slice::<ManifestDocument>(&raw) {
            Ok(document) => Ok(document),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Manifest is not a valid JSON object, treating as empty");
                Ok(ManifestDocument::new())
            },
        }
    }

    async fn save(&self, document: &ManifestDocument) -> Result<()> {
        let body = serde_json::to_vec_pretty(document)
            .map_err(|e| IngestError::Manifest(format!("serializing manifest: {e}")))?;
        self.store
            .put(&self.key, Bytes::from(body))
            .await
            .map_err(|e| IngestError::Manifest(format!("writing {}: {e}", self.key)))
    }

    pub async fn entry(&self, source_id: &str) -> Result<Option<ManifestEntry>> {
        let document = self.load().await?;
        Ok(parse_entry(&document, source_id))
    }

    pub async fn stored_version(&self, source_id: &str) -> Result<Option<String>> {
        Ok(self.entry(source_id).await?.map(|entry| entry.version))
    }

    async fn replace(&self, source_id: &str, entry: &ManifestEntry) -> Result<()> {
        let mut document = self.load().await?;
        let value = serde_json::to_value(entry)
            .map_err(|e| IngestError::Manifest(format!("serializing entry '{source_id}': {e}")))?;
        document.insert(source_id.to_string(), value);
        self.save(&document).await
    }

    /// Replace the source's entry after a successful ingestion.
    pub async fn record_ingestion(
        &self,
        source_id: &str,
        version: &str,
        hosts: Vec<String>,
        files: Vec<String>,
    ) -> Result<ManifestEntry> {
        let entry = ManifestEntry::ingested(version, Utc::now(), hosts, files);
        self.replace(source_id, &entry).await?;
        info!(
            source = %source_id,
            version = %version,
            files = entry.list_of_files.len(),
            "Manifest updated"
        );
        Ok(entry)
    }

    /// Flag the source's entry as fully extracted.
    pub async fn record_extraction(&self, source_id: &str, extracted_files: Vec<String>) -> Result<()> {
        let document = self.load().await?;
        let mut entry = parse_entry(&document, source_id)
            .ok_or_else(|| IngestError::Manifest(format!("no manifest entry for '{source_id}'")))?;
        entry.extracted = true;
        entry.extracted_list_of_files = extracted_files;
        self.replace(source_id, &entry).await?;
        debug!(source = %source_id, "Manifest entry flagged as extracted");
        Ok(())
    }
}

fn parse_entry(document: &ManifestDocument, source_id: &str) -> Option<ManifestEntry> {
    let value = document.get(source_id)?;
    match serde_json::from_value(value.clone()) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!(source = %source_id, error = %e, "Ignoring malformed manifest entry");
            None
        },
    }
}
