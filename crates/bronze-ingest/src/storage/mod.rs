//! Object storage abstraction
//!
//! Ingestion only needs a flat key namespace with overwrite semantics, so the
//! [`BlobStore`] trait covers exactly that: whole-object and streaming writes,
//! ranged reads, listing by prefix, server-side copy and delete.
//!
//! [`S3Store`] talks to S3-compatible storage (AWS, MinIO). [`MemoryStore`]
//! keeps objects in process and backs the test suites.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use thiserror::Error;

pub mod config;
pub mod memory;
pub mod paths;
pub mod s3;

pub use config::StorageConfig;
pub use memory::MemoryStore;
pub use s3::S3Store;

/// Chunked byte stream flowing into or out of storage.
pub type ChunkStream = BoxStream<'static, std::io::Result<Bytes>>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage backend error on '{key}': {message}")]
    Backend { key: String, message: String },

    /// The stream feeding an upload failed before it completed.
    #[error("upload source failed: {0}")]
    Source(#[from] std::io::Error),

    #[error("copy '{from}' -> '{to}' not confirmed after {polls} checks")]
    CopyUnconfirmed { from: String, to: String, polls: u32 },
}

impl StorageError {
    pub fn backend(key: impl Into<String>, message: impl ToString) -> Self {
        Self::Backend {
            key: key.into(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write a whole object, replacing any existing one.
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StorageError>;

    /// Write an object from a chunk stream without buffering it whole.
    ///
    /// Returns the number of bytes written. An error from the stream aborts the
    /// write and is returned as [`StorageError::Source`].
    async fn put_stream(&self, key: &str, stream: ChunkStream) -> Result<u64, StorageError>;

    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;

    /// Read `len` bytes starting at `start`. Short objects yield fewer bytes.
    async fn get_range(&self, key: &str, start: u64, len: u64) -> Result<Bytes, StorageError>;

    async fn get_stream(&self, key: &str) -> Result<ChunkStream, StorageError>;

    /// Object metadata, or `None` when the key does not exist.
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StorageError>;

    /// Every object under `prefix`, across all result pages.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StorageError>;

    /// Server-side copy. Returns once the destination is confirmed.
    async fn copy(&self, from: &str, to: &str) -> Result<(), StorageError>;

    /// Delete an object. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.head(key).await?.is_some())
    }
}
