use super::{BlobStore, ChunkStream, ObjectMeta, StorageConfig, StorageError};
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::Region,
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
    Client,
};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Smallest part S3 accepts for every part but the last.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Largest object `CopyObject` can handle in one request.
const SINGLE_COPY_LIMIT: u64 = 5 * 1024 * 1024 * 1024;

/// Range size for `UploadPartCopy` above the single-copy limit.
const COPY_PART_SIZE: u64 = 1024 * 1024 * 1024;

const COPY_CONFIRM_POLLS: u32 = 10;
const COPY_CONFIRM_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    part_size: usize,
}

impl S3Store {
    pub async fn new(config: &StorageConfig, part_size: usize) -> Self {
        debug!(bucket = %config.bucket, endpoint = ?config.endpoint, "Initializing S3 store");

        let client = match config.static_credentials() {
            Some((access_key, secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key, None, None, "bronze-storage");
                let mut builder = aws_sdk_s3::Config::builder()
                    .behavior_version_latest()
                    .credentials_provider(credentials)
                    .region(Region::new(config.region.clone()))
                    .force_path_style(config.path_style);
                if let Some(endpoint) = &config.endpoint {
                    builder = builder.endpoint_url(endpoint);
                }
                Client::from_conf(builder.build())
            },
            None => {
                let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()));
                if let Some(endpoint) = &config.endpoint {
                    loader = loader.endpoint_url(endpoint);
                }
                let shared = loader.load().await;
                let s3_config = aws_sdk_s3::config::Builder::from(&shared)
                    .force_path_style(config.path_style)
                    .build();
                Client::from_conf(s3_config)
            },
        };

        info!(bucket = %config.bucket, "Storage client initialized");

        Self {
            client,
            bucket: config.bucket.clone(),
            part_size: part_size.max(MIN_PART_SIZE),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// `CopySource` header value: bucket and key, each key segment URL-encoded.
    fn copy_source(&self, key: &str) -> String {
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}", self.bucket, encoded.join("/"))
    }

    async fn put_single(&self, key: &str, body: Bytes) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| backend(key, e))?;
        Ok(())
    }

    /// Upload `first` and the rest of `stream` as parts of `upload_id`.
    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first: BytesMut,
        mut stream: ChunkStream,
    ) -> Result<u64, StorageError> {
        let mut parts = Vec::new();
        let mut buffer = first;
        let mut written = 0u64;

        loop {
            let finished = loop {
                if buffer.len() >= self.part_size {
                    break false;
                }
                match stream.next().await {
                    Some(chunk) => buffer.extend_from_slice(&chunk?),
                    None => break true,
                }
            };

            if !buffer.is_empty() || parts.is_empty() {
                let part_number = parts.len() as i32 + 1;
                let body = buffer.split().freeze();
                written += body.len() as u64;

                let output = self
                    .client
                    .upload_part()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .body(ByteStream::from(body))
                    .send()
                    .await
                    .map_err(|e| backend(key, e))?;

                debug!(key, part_number, "Uploaded part");
                parts.push(
                    CompletedPart::builder()
                        .set_e_tag(output.e_tag().map(str::to_string))
                        .part_number(part_number)
                        .build(),
                );
            }

            if finished {
                break;
            }
        }

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| backend(key, e))?;

        Ok(written)
    }

    async fn copy_multipart(&self, from: &str, to: &str, size: u64) -> Result<(), StorageError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(to)
            .send()
            .await
            .map_err(|e| backend(to, e))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StorageError::backend(to, "multipart upload id missing"))?
            .to_string();

        let result = self.copy_ranges(from, to, &upload_id, size).await;
        if result.is_err() {
            self.abort(to, &upload_id).await;
        }
        result
    }

    async fn copy_ranges(
        &self,
        from: &str,
        to: &str,
        upload_id: &str,
        size: u64,
    ) -> Result<(), StorageError> {
        let mut parts = Vec::new();
        let mut offset = 0u64;

        while offset < size {
            let end = (offset + COPY_PART_SIZE).min(size) - 1;
            let part_number = parts.len() as i32 + 1;
            let output = self
                .client
                .upload_part_copy()
                .bucket(&self.bucket)
                .key(to)
                .upload_id(upload_id)
                .part_number(part_number)
                .copy_source(self.copy_source(from))
                .copy_source_range(format!("bytes={offset}-{end}"))
                .send()
                .await
                .map_err(|e| backend(to, e))?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(
                        output
                            .copy_part_result()
                            .and_then(|r| r.e_tag())
                            .map(str::to_string),
                    )
                    .part_number(part_number)
                    .build(),
            );
            offset = end + 1;
        }

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(to)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| backend(to, e))?;
        Ok(())
    }

    async fn abort(&self, key: &str, upload_id: &str) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            warn!(key, upload_id, error = %DisplayErrorContext(&e), "Failed to abort multipart upload");
        }
    }
}

fn backend<E>(key: &str, err: E) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StorageError::backend(key, DisplayErrorContext(&err))
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

#[async_trait]
impl BlobStore for S3Store {
    #[instrument(skip(self, data), fields(bucket = %self.bucket, size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StorageError> {
        self.put_single(key, data).await?;
        debug!("Uploaded object");
        Ok(())
    }

    #[instrument(skip(self, stream), fields(bucket = %self.bucket))]
    async fn put_stream(&self, key: &str, mut stream: ChunkStream) -> Result<u64, StorageError> {
        let mut first = BytesMut::with_capacity(self.part_size);
        let mut exhausted = true;

        while let Some(chunk) = stream.next().await {
            first.extend_from_slice(&chunk?);
            if first.len() >= self.part_size {
                exhausted = false;
                break;
            }
        }

        if exhausted {
            let written = first.len() as u64;
            self.put_single(key, first.freeze()).await?;
            debug!(bytes = written, "Uploaded object in a single request");
            return Ok(written);
        }

        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| backend(key, e))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StorageError::backend(key, "multipart upload id missing"))?
            .to_string();

        match self.upload_parts(key, &upload_id, first, stream).await {
            Ok(written) => {
                info!(bytes = written, "Completed multipart upload");
                Ok(written)
            },
            Err(e) => {
                self.abort(key, &upload_id).await;
                Err(e)
            },
        }
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let output = match self.client.get_object().bucket(&self.bucket).key(key).send().await {
            Ok(output) => output,
            Err(e) => {
                let service = e.into_service_error();
                return Err(if service.is_no_such_key() {
                    StorageError::NotFound(key.to_string())
                } else {
                    backend(key, service)
                });
            },
        };

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| backend(key, e))?
            .into_bytes();
        Ok(data)
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn get_range(&self, key: &str, start: u64, len: u64) -> Result<Bytes, StorageError> {
        if len == 0 {
            return Ok(Bytes::new());
        }

        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(format!("bytes={}-{}", start, start + len - 1))
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let service = e.into_service_error();
                return Err(if service.is_no_such_key() {
                    StorageError::NotFound(key.to_string())
                } else {
                    backend(key, service)
                });
            },
        };

        Ok(output
            .body
            .collect()
            .await
            .map_err(|e| backend(key, e))?
            .into_bytes())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn get_stream(&self, key: &str) -> Result<ChunkStream, StorageError> {
        let output = match self.client.get_object().bucket(&self.bucket).key(key).send().await {
            Ok(output) => output,
            Err(e) => {
                let service = e.into_service_error();
                return Err(if service.is_no_such_key() {
                    StorageError::NotFound(key.to_string())
                } else {
                    backend(key, service)
                });
            },
        };

        let stream = futures::stream::try_unfold(output.body, |mut body| async move {
            match body.try_next().await {
                Ok(Some(chunk)) => Ok(Some((chunk, body))),
                Ok(None) => Ok(None),
                Err(e) => Err(std::io::Error::other(e)),
            }
        });
        Ok(stream.boxed())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StorageError> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(output) => Ok(Some(ObjectMeta {
                key: key.to_string(),
                size: output.content_length().unwrap_or(0).max(0) as u64,
                last_modified: output.last_modified().and_then(to_chrono),
            })),
            Err(e) => {
                let service = e.into_service_error();
                if service.is_not_found() {
                    Ok(None)
                } else {
                    Err(backend(key, service))
                }
            },
        }
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StorageError> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| backend(prefix, e))?;

            objects.extend(output.contents().iter().filter_map(|object| {
                object.key().map(|key| ObjectMeta {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object.last_modified().and_then(to_chrono),
                })
            }));

            match (output.is_truncated(), output.next_continuation_token()) {
                (Some(true), Some(token)) => continuation = Some(token.to_string()),
                _ => break,
            }
        }

        debug!(count = objects.len(), "Listed objects");
        Ok(objects)
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn copy(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let source = self
            .head(from)
            .await?
            .ok_or_else(|| StorageError::NotFound(from.to_string()))?;

        if source.size > SINGLE_COPY_LIMIT {
            self.copy_multipart(from, to, source.size).await?;
        } else {
            self.client
                .copy_object()
                .bucket(&self.bucket)
                .copy_source(self.copy_source(from))
                .key(to)
                .send()
                .await
                .map_err(|e| backend(to, e))?;
        }

        for poll in 1..=COPY_CONFIRM_POLLS {
            if let Some(dest) = self.head(to).await? {
                if dest.size == source.size {
                    debug!(poll, "Copy confirmed");
                    return Ok(());
                }
            }
            tokio::time::sleep(COPY_CONFIRM_INTERVAL).await;
        }

        Err(StorageError::CopyUnconfirmed {
            from: from.to_string(),
            to: to.to_string(),
            polls: COPY_CONFIRM_POLLS,
        })
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| backend(key, e))?;
        debug!("Deleted object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_store() -> S3Store {
        S3Store {
            client: Client::from_conf(
                aws_sdk_s3::Config::builder()
                    .behavior_version_latest()
                    .region(Region::new("us-east-1"))
                    .build(),
            ),
            bucket: "bronze".to_string(),
            part_size: MIN_PART_SIZE,
        }
    }

    #[test]
    fn test_copy_source_encodes_segments() {
        let store = offline_store();
        assert_eq!(
            store.copy_source("raw/acme/latest/v 1/a+b.txt"),
            "bronze/raw/acme/latest/v%201/a%2Bb.txt"
        );
    }

    #[test]
    fn test_to_chrono() {
        let dt = aws_sdk_s3::primitives::DateTime::from_secs(1_700_000_000);
        assert_eq!(to_chrono(&dt).unwrap().timestamp(), 1_700_000_000);
    }
}
