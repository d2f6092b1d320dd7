//! Extraction stage
//!
//! Unpacks the files of a source's manifest entry into the `extracted/`
//! mirror of the raw zone:
//!
//! - `*.gz` (not `*.tar.gz`) is decompressed as a stream
//! - `*.zip` is sniffed first; gzip content behind a `.zip` name takes the
//!   gzip path, real archives are unpacked member by member
//! - everything else is copied unchanged
//!
//! The manifest entry is flagged as extracted only after every file succeeds.

pub mod format;
pub mod gzip;
pub mod unzip;

use crate::error::{IngestError, Result};
use crate::manifest::ManifestStore;
use crate::storage::{paths, BlobStore};
use bytes::Bytes;
use format::{ArtifactKind, GZIP_MAGIC};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct Extractor {
    store: Arc<dyn BlobStore>,
    manifest: ManifestStore,
}

impl Extractor {
    pub fn new(store: Arc<dyn BlobStore>, manifest: ManifestStore) -> Self {
        Self { store, manifest }
    }

    /// Extract every file of the source's manifest entry.
    ///
    /// Returns the extracted keys, which are also recorded in the manifest.
    #[instrument(skip(self))]
    pub async fn extract_source(&self, source_id: &str) -> Result<Vec<String>> {
        let entry = self
            .manifest
            .entry(source_id)
            .await?
            .ok_or_else(|| IngestError::extraction(source_id, "no manifest entry for source"))?;

        if entry.list_of_files.is_empty() {
            warn!(source = %source_id, "Manifest entry lists no files, nothing to extract");
        }

        let mut extracted = Vec::new();
        for raw_key in &entry.list_of_files {
            extracted.extend(self.extract_file(raw_key).await?);
        }

        self.manifest.record_extraction(source_id, extracted.clone()).await?;
        info!(source = %source_id, files = extracted.len(), "Extraction complete");
        Ok(extracted)
    }

    /// Extract one raw object, returning the keys written.
    pub async fn extract_file(&self, raw_key: &str) -> Result<Vec<String>> {
        let dest = paths::extracted_key(raw_key)
            .ok_or_else(|| IngestError::extraction(raw_key, "not under the raw zone"))?;

        match format::classify_name(raw_key) {
            ArtifactKind::Gzip => self.gunzip(raw_key, &dest).await.map(|key| vec![key]),
            ArtifactKind::Zip => {
                let head = self
                    .store
                    .get_range(raw_key, 0, GZIP_MAGIC.len() as u64)
                    .await
                    .map_err(|e| IngestError::extraction(raw_key, e))?;
                if format::is_gzip(&head) {
                    warn!(key = %raw_key, "Gzip content behind a .zip name, decompressing as gzip");
                    self.gunzip(raw_key, &dest).await.map(|key| vec![key])
                } else {
                    self.unzip(raw_key, &dest).await
                }
            },
            ArtifactKind::Passthrough => self.copy(raw_key, &dest).await.map(|key| vec![key]),
        }
    }

    async fn gunzip(&self, raw_key: &str, dest: &str) -> Result<String> {
        let dest = format::strip_compression_extension(dest).to_string();
        debug!(from = %raw_key, to = %dest, "Decompressing gzip");

        let input = self
            .store
            .get_stream(raw_key)
            .await
            .map_err(|e| IngestError::extraction(raw_key, e))?;
        let bytes = self
            .store
            .put_stream(&dest, gzip::gunzip(input))
            .await
            .map_err(|e| IngestError::extraction(raw_key, e))?;

        info!(from = %raw_key, to = %dest, bytes, "Decompressed");
        Ok(dest)
    }

    async fn unzip(&self, raw_key: &str, dest: &str) -> Result<Vec<String>> {
        let root = format::strip_compression_extension(dest).to_string();
        let data = self
            .store
            .get(raw_key)
            .await
            .map_err(|e| IngestError::extraction(raw_key, e))?;
        let mut archive = unzip::open(data).map_err(|e| IngestError::extraction(raw_key, e))?;
        info!(key = %raw_key, root = %root, members = archive.len(), "Unpacking zip archive");

        let mut written = Vec::new();
        for index in 0..archive.len() {
            let member = unzip::read_member(&mut archive, index).map_err(|e| IngestError::extraction(raw_key, e))?;
            let Some((relative, data)) = member else {
                continue;
            };

            let key = format!("{root}/{relative}");
            self.store
                .put(&key, Bytes::from(data))
                .await
                .map_err(|e| IngestError::extraction(raw_key, e))?;
            debug!(member = %relative, key = %key, "Extracted member");
            written.push(key);
        }

        Ok(written)
    }

    async fn copy(&self, raw_key: &str, dest: &str) -> Result<String> {
        let input = self
            .store
            .get_stream(raw_key)
            .await
            .map_err(|e| IngestError::extraction(raw_key, e))?;
        self.store
            .put_stream(dest, input)
            .await
            .map_err(|e| IngestError::extraction(raw_key, e))?;
        debug!(from = %raw_key, to = %dest, "Copied unchanged");
        Ok(dest.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gz(data: &[u8]) -> Bytes {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        Bytes::from(encoder.finish().unwrap())
    }

    async fn setup(files: Vec<(&str, Bytes)>) -> (Arc<MemoryStore>, ManifestStore, Extractor) {
        let store = Arc::new(MemoryStore::new());
        let manifest = ManifestStore::new(store.clone(), "manifest.json");
        let mut keys = Vec::new();
        for (key, data) in files {
            store.put(key, data).await.unwrap();
            keys.push(key.to_string());
        }
        manifest.record_ingestion("src", "v1", vec![], keys).await.unwrap();
        let extractor = Extractor::new(store.clone(), manifest.clone());
        (store, manifest, extractor)
    }

    #[tokio::test]
    async fn test_misnamed_gzip_takes_gzip_path() {
        let (store, manifest, extractor) = setup(vec![("raw/src/latest/v1/data.zip", gz(b"plain rows"))]).await;

        let extracted = extractor.extract_source("src").await.unwrap();
        assert_eq!(extracted, vec!["extracted/src/latest/v1/data".to_string()]);
        assert_eq!(
            store.get("extracted/src/latest/v1/data").await.unwrap(),
            Bytes::from_static(b"plain rows")
        );

        let entry = manifest.entry("src").await.unwrap().unwrap();
        assert!(entry.extracted);
        assert_eq!(entry.extracted_list_of_files, extracted);
    }

    #[tokio::test]
    async fn test_zip_members_preserve_structure() {
        let archive = unzip::tests::build(&["csv/"], &[("csv/Food.csv", b"a,b"), ("csv/sub/Nutrient.csv", b"c")]);
        let (store, _, extractor) = setup(vec![("raw/src/latest/v1/foodb.zip", Bytes::from(archive))]).await;

        let extracted = extractor.extract_source("src").await.unwrap();
        assert_eq!(
            extracted,
            vec![
                "extracted/src/latest/v1/foodb/csv/Food.csv".to_string(),
                "extracted/src/latest/v1/foodb/csv/sub/Nutrient.csv".to_string(),
            ]
        );
        assert_eq!(
            store.get("extracted/src/latest/v1/foodb/csv/sub/Nutrient.csv").await.unwrap(),
            Bytes::from_static(b"c")
        );
    }

    #[tokio::test]
    async fn test_gzip_and_passthrough() {
        let (store, _, extractor) = setup(vec![
            ("raw/src/latest/v1/variant_summary.txt.gz", gz(b"rows")),
            ("raw/src/latest/v1/hp.owl", Bytes::from_static(b"<rdf/>")),
            ("raw/src/latest/v1/bundle.tar.gz", gz(b"tar")),
        ])
        .await;

        let extracted = extractor.extract_source("src").await.unwrap();
        assert_eq!(
            extracted,
            vec![
                "extracted/src/latest/v1/variant_summary.txt".to_string(),
                "extracted/src/latest/v1/hp.owl".to_string(),
                "extracted/src/latest/v1/bundle.tar.gz".to_string(),
            ]
        );
        assert_eq!(
            store.get("extracted/src/latest/v1/hp.owl").await.unwrap(),
            Bytes::from_static(b"<rdf/>")
        );
        assert_eq!(
            store.get("extracted/src/latest/v1/bundle.tar.gz").await.unwrap(),
            gz(b"tar")
        );
    }

    #[tokio::test]
    async fn test_one_failure_leaves_manifest_unextracted() {
        let (_, manifest, extractor) = setup(vec![
            ("raw/src/latest/v1/a.txt", Bytes::from_static(b"ok")),
            ("raw/src/latest/v1/b.gz", Bytes::from_static(b"not gzip at all")),
            ("raw/src/latest/v1/c.txt", Bytes::from_static(b"ok")),
        ])
        .await;

        let err = extractor.extract_source("src").await.unwrap_err();
        assert!(matches!(err, IngestError::Extraction { .. }));
        assert_eq!(err.exit_code(), 7);

        let entry = manifest.entry("src").await.unwrap().unwrap();
        assert!(!entry.extracted);
        assert!(entry.extracted_list_of_files.is_empty());
    }

    #[tokio::test]
    async fn test_missing_entry_is_extraction_error() {
        let store = Arc::new(MemoryStore::new());
        let manifest = ManifestStore::new(store.clone(), "manifest.json");
        let extractor = Extractor::new(store, manifest);
        assert!(matches!(
            extractor.extract_source("ghost").await.unwrap_err(),
            IngestError::Extraction { .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_raw_object_fails() {
        let (_, _, extractor) = setup(vec![]).await;
        let err = extractor.extract_file("raw/src/latest/v1/gone.txt").await.unwrap_err();
        assert!(matches!(err, IngestError::Extraction { .. }));
    }
}
