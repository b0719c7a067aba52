//! S3-compatible object storage (MinIO, AWS S3, Backblaze, ...).
//!
//! Uploads stream through multipart upload in fixed-size parts, so at most
//! one part is held in memory. Moves are copy-then-delete: a crash between
//! the two leaves the object under both keys.

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use super::{ObjectReader, ObjectSource, ObjectStore, StorageError, StorageResult};
use crate::config::StorageConfig;
use crate::range::ByteRange;

/// Size of each multipart upload part. S3 requires at least 5 MiB for all
/// but the last part.
const PART_SIZE: usize = 8 * 1024 * 1024;

/// Object storage in an S3 bucket.
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    /// Create from an existing SDK client.
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client from configuration.
    ///
    /// An endpoint without a scheme gets `https://` when `secure` is set and
    /// `http://` otherwise. Path-style addressing is used for MinIO.
    pub fn connect(config: &StorageConfig) -> Self {
        let endpoint = endpoint_url(&config.endpoint, config.secure);
        let creds = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "driveshed",
        );
        let sdk_config = aws_sdk_s3::Config::builder()
            .endpoint_url(endpoint)
            .region(Region::new(config.region.clone()))
            .credentials_provider(creds)
            .force_path_style(true)
            .behavior_version(BehaviorVersion::latest())
            .build();
        Self::new(Client::from_conf(sdk_config), config.bucket.clone())
    }

    /// Create the bucket unless it already exists.
    pub async fn ensure_bucket(&self) -> StorageResult<()> {
        match self.client.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => match self.client.head_bucket().bucket(&self.bucket).send().await {
                Ok(_) => Ok(()),
                Err(_) => Err(StorageError::Backend(format!(
                    "failed to create or access bucket {}: {e}",
                    self.bucket
                ))),
            },
        }
    }

    async fn put_single(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("S3 PUT {key} failed: {e}")))?;
        Ok(())
    }

    async fn put_multipart(
        &self,
        key: &str,
        first: Vec<u8>,
        reader: &mut ObjectSource,
        content_type: &str,
    ) -> StorageResult<u64> {
        let upload = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("S3 multipart start {key} failed: {e}")))?;
        let upload_id = upload
            .upload_id()
            .ok_or_else(|| StorageError::Backend(format!("S3 returned no upload id for {key}")))?
            .to_string();

        let uploaded = self.upload_parts(key, &upload_id, first, reader).await;
        match uploaded {
            Ok((parts, total)) => {
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|e| {
                        StorageError::Backend(format!("S3 multipart complete {key} failed: {e}"))
                    })?;
                Ok(total)
            }
            Err(e) => {
                if let Err(abort) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(key, error = %abort, "failed to abort multipart upload");
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first: Vec<u8>,
        reader: &mut ObjectSource,
    ) -> StorageResult<(Vec<CompletedPart>, u64)> {
        let mut parts = Vec::new();
        let mut total = 0u64;
        let mut chunk = first;
        let mut part_number = 1;

        while !chunk.is_empty() {
            total += chunk.len() as u64;
            let response = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|e| {
                    StorageError::Backend(format!("S3 upload part {part_number} of {key} failed: {e}"))
                })?;
            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(response.e_tag().map(str::to_string))
                    .build(),
            );
            part_number += 1;
            chunk = read_part(reader).await?;
        }
        Ok((parts, total))
    }
}

fn endpoint_url(endpoint: &str, secure: bool) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else if secure {
        format!("https://{endpoint}")
    } else {
        format!("http://{endpoint}")
    }
}

/// Object key for a drive path.
fn object_key(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Fill up to one part from the reader. Short only at end of stream.
async fn read_part(reader: &mut ObjectSource) -> StorageResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(PART_SIZE);
    let mut limited = reader.take(PART_SIZE as u64);
    limited.read_to_end(&mut buf).await?;
    Ok(buf)
}

fn is_status<E>(err: &SdkError<E>, status: u16) -> bool {
    matches!(err, SdkError::ServiceError(e) if e.raw().status().as_u16() == status)
}

fn is_not_found<E>(err: &SdkError<E>) -> bool {
    is_status(err, 404)
}

#[async_trait]
impl ObjectStore for S3Storage {
    async fn get_object(&self, path: &str, range: Option<ByteRange>) -> StorageResult<ObjectReader> {
        let key = object_key(path);
        let mut request = self.client.get_object().bucket(&self.bucket).key(key);
        if let Some(range) = range {
            request = request.range(range.header_value());
        }

        let response = request.send().await.map_err(|e| {
            if is_not_found(&e) {
                StorageError::NotFound(path.to_string())
            } else if is_status(&e, 416) {
                StorageError::RangeNotSatisfiable(path.to_string())
            } else {
                StorageError::Backend(format!("S3 GET {key} failed: {e}"))
            }
        })?;

        Ok(Box::pin(response.body.into_async_read()))
    }

    async fn put_object(
        &self,
        path: &str,
        size: u64,
        mut reader: ObjectSource,
        content_type: &str,
    ) -> StorageResult<()> {
        let key = object_key(path);
        let first = read_part(&mut reader).await?;

        let actual = if first.len() < PART_SIZE {
            let len = first.len() as u64;
            if len != size {
                return Err(StorageError::SizeMismatch {
                    path: path.to_string(),
                    expected: size,
                    actual: len,
                });
            }
            self.put_single(key, first, content_type).await?;
            len
        } else {
            self.put_multipart(key, first, &mut reader, content_type).await?
        };

        if actual != size {
            // The object is already visible; remove it so a failed upload
            // leaves nothing behind.
            if let Err(e) = self.delete_object(path).await {
                warn!(path, error = %e, "failed to remove object after size mismatch");
            }
            return Err(StorageError::SizeMismatch {
                path: path.to_string(),
                expected: size,
                actual,
            });
        }
        debug!(path, size = actual, "object stored");
        Ok(())
    }

    async fn move_object(&self, from: &str, to: &str) -> StorageResult<()> {
        let source = format!("{}/{}", self.bucket, urlencoding::encode(object_key(from)));
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(source)
            .key(object_key(to))
            .send()
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    StorageError::NotFound(from.to_string())
                } else {
                    StorageError::Backend(format!("S3 COPY {from} -> {to} failed: {e}"))
                }
            })?;

        self.delete_object(from).await?;
        debug!(from, to, "object moved");
        Ok(())
    }

    async fn delete_object(&self, path: &str) -> StorageResult<()> {
        let key = object_key(path);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    StorageError::NotFound(path.to_string())
                } else {
                    StorageError::Backend(format!("S3 DELETE {key} failed: {e}"))
                }
            })?;
        debug!(path, "object deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url() {
        assert_eq!(endpoint_url("minio:9000", false), "http://minio:9000");
        assert_eq!(endpoint_url("s3.example.com", true), "https://s3.example.com");
        assert_eq!(endpoint_url("http://localhost:9000", true), "http://localhost:9000");
    }

    #[test]
    fn test_object_key() {
        assert_eq!(object_key("/docs/a.txt"), "docs/a.txt");
    }

    #[tokio::test]
    async fn test_read_part_is_bounded() {
        let data = vec![7u8; PART_SIZE + 10];
        let mut reader: ObjectSource = Box::new(std::io::Cursor::new(data));
        let first = read_part(&mut reader).await.unwrap();
        let second = read_part(&mut reader).await.unwrap();
        let third = read_part(&mut reader).await.unwrap();
        assert_eq!(first.len(), PART_SIZE);
        assert_eq!(second.len(), 10);
        assert!(third.is_empty());
    }

    #[test]
    fn test_connect_builds_client() {
        let config = StorageConfig {
            storage_type: crate::config::StorageType::S3,
            endpoint: "localhost:9000".to_string(),
            ..Default::default()
        };
        let storage = S3Storage::connect(&config);
        assert_eq!(storage.bucket, "driveshed");
    }
}
