//! Streaming transfer engine
//!
//! Moves bytes from a remote source into storage chunk by chunk. An optional
//! digest is computed over the same chunks on their way through; it is never
//! obtained by reading the stored object back.

pub mod ftp;
pub mod http;

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::storage::{BlobStore, ChunkStream, StorageError};
use crate::versioning::fetch::USER_AGENT;
use bronze_common::checksum::{verify_checksum, ChecksumAlgorithm, StreamingDigest};
use futures::StreamExt;
use reqwest::{Client, Response};
use std::io;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};

pub use ftp::{FtpClient, FtpLocation, FtpSettings};
pub use http::HttpRequest;

/// Whether and how to hash transferred content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DigestMode {
    #[default]
    Skip,
    Compute,
    /// Compute and compare against an expected SHA-256 hex digest.
    Verify { expected: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub key: String,
    pub bytes: u64,
    pub digest: Option<String>,
}

/// Server-side copy confirmed by the store, then removal of the source.
pub async fn relocate(store: &dyn BlobStore, from: &str, to: &str) -> Result<(), StorageError> {
    store.copy(from, to).await?;
    store.delete(from).await?;
    debug!(from, to, "Relocated object");
    Ok(())
}

type SharedDigest = Arc<Mutex<StreamingDigest>>;

fn digesting(stream: ChunkStream, digest: SharedDigest) -> ChunkStream {
    stream
        .map(move |chunk| {
            let chunk = chunk?;
            digest
                .lock()
                .map_err(|_| io::Error::other("digest state poisoned"))?
                .update(&chunk);
            Ok(chunk)
        })
        .boxed()
}

#[derive(Clone)]
pub struct TransferEngine {
    store: Arc<dyn BlobStore>,
    client: Client,
    ftp: FtpSettings,
}

impl TransferEngine {
    pub fn new(store: Arc<dyn BlobStore>, config: &IngestConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.http.connect_timeout())
            .timeout(config.http.download_timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| IngestError::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            store,
            client,
            ftp: config.ftp.clone(),
        })
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    pub fn ftp_client(&self, location: FtpLocation) -> FtpClient {
        FtpClient::new(location, self.ftp.clone())
    }

    /// Send a GET and fail on any non-2xx status.
    pub async fn fetch(&self, request: &HttpRequest) -> Result<Response> {
        let response = self
            .client
            .get(&request.url)
            .query(&request.params)
            .headers(request.headers.clone())
            .send()
            .await
            .map_err(|e| IngestError::transfer(&request.url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::transfer(&request.url, format!("HTTP {status}")));
        }
        Ok(response)
    }

    /// Stream an already-open response body into `key`.
    pub async fn upload_response(
        &self,
        locator: &str,
        response: Response,
        key: &str,
        digest: DigestMode,
    ) -> Result<TransferReceipt> {
        let body = response.bytes_stream().map(|chunk| chunk.map_err(io::Error::other)).boxed();
        self.upload(locator, body, key, digest).await
    }

    #[instrument(skip(self, request, digest), fields(url = %request.url))]
    pub async fn http_to_store(&self, request: &HttpRequest, key: &str, digest: DigestMode) -> Result<TransferReceipt> {
        let response = self.fetch(request).await?;
        self.upload_response(&request.url, response, key, digest).await
    }

    #[instrument(skip(self, client, digest), fields(host = %client.location().display_host()))]
    pub async fn ftp_to_store(
        &self,
        client: &FtpClient,
        file_name: &str,
        key: &str,
        digest: DigestMode,
    ) -> Result<TransferReceipt> {
        let stream = client.stream(file_name).await?;
        self.upload(&client.location().url(file_name), stream, key, digest).await
    }

    async fn upload(&self, locator: &str, stream: ChunkStream, key: &str, mode: DigestMode) -> Result<TransferReceipt> {
        let shared = match mode {
            DigestMode::Skip => None,
            _ => Some(Arc::new(Mutex::new(StreamingDigest::new(ChecksumAlgorithm::Sha256)))),
        };
        let stream = match &shared {
            Some(digest) => digesting(stream, digest.clone()),
            None => stream,
        };

        let bytes = self.store.put_stream(key, stream).await.map_err(|e| match e {
            StorageError::Source(io) => IngestError::transfer(locator, io),
            other => IngestError::Storage(other),
        })?;

        let digest = match shared {
            Some(shared) => Some(
                Arc::try_unwrap(shared)
                    .map_err(|_| IngestError::transfer(locator, "digest still in use after upload"))?
                    .into_inner()
                    .map_err(|_| IngestError::transfer(locator, "digest state poisoned"))?
                    .finalize(),
            ),
            None => None,
        };

        if let (DigestMode::Verify { expected }, Some(actual)) = (&mode, &digest) {
            verify_checksum(expected, actual).map_err(|e| IngestError::transfer(locator, e))?;
        }

        info!(
            source = %locator,
            key = %key,
            bytes,
            sha256 = digest.as_deref().unwrap_or("-"),
            "Transferred"
        );

        Ok(TransferReceipt {
            key: key.to_string(),
            bytes,
            digest,
        })
    }
}
