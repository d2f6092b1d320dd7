use super::{BlobStore, ChunkStream, ObjectMeta, StorageError};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Chunk size used when streaming objects back out.
const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

/// In-process object store
///
/// Keys are kept ordered so listings come back sorted, like S3.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All keys currently stored, in order.
    pub fn keys(&self) -> Vec<String> {
        self.objects()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn objects(&self) -> Result<MutexGuard<'_, BTreeMap<String, StoredObject>>, StorageError> {
        self.objects
            .lock()
            .map_err(|_| StorageError::backend("*", "memory store lock poisoned"))
    }

    fn insert(&self, key: &str, data: Bytes) -> Result<(), StorageError> {
        self.objects()?.insert(
            key.to_string(),
            StoredObject {
                data,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    fn fetch(&self, key: &str) -> Result<Bytes, StorageError> {
        self.objects()?
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StorageError> {
        self.insert(key, data)
    }

    async fn put_stream(&self, key: &str, mut stream: ChunkStream) -> Result<u64, StorageError> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        let written = buffer.len() as u64;
        self.insert(key, buffer.freeze())?;
        Ok(written)
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        self.fetch(key)
    }

    async fn get_range(&self, key: &str, start: u64, len: u64) -> Result<Bytes, StorageError> {
        let data = self.fetch(key)?;
        let start = usize::try_from(start).unwrap_or(usize::MAX).min(data.len());
        let end = start
            .saturating_add(usize::try_from(len).unwrap_or(usize::MAX))
            .min(data.len());
        Ok(data.slice(start..end))
    }

    async fn get_stream(&self, key: &str) -> Result<ChunkStream, StorageError> {
        let data = self.fetch(key)?;
        let chunks: Vec<std::io::Result<Bytes>> = (0..data.len())
            .step_by(READ_CHUNK)
            .map(|offset| Ok(data.slice(offset..(offset + READ_CHUNK).min(data.len()))))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StorageError> {
        Ok(self.objects()?.get(key).map(|object| ObjectMeta {
            key: key.to_string(),
            size: object.data.len() as u64,
            last_modified: Some(object.last_modified),
        }))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StorageError> {
        Ok(self
            .objects()?
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectMeta {
                key: key.clone(),
                size: object.data.len() as u64,
                last_modified: Some(object.last_modified),
            })
            .collect())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let data = self.fetch(from)?;
        self.insert(to, data)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects()?.remove(key);
        Ok(())
    }
}
