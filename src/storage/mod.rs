//! Object storage for file contents.
//!
//! Objects are keyed by their absolute drive path. Two backends exist: a
//! local directory tree and an S3-compatible bucket. The backend is picked
//! once from configuration and wrapped in [`Storage`].

mod local;
mod s3;

pub use local::LocalStorage;
pub use s3::S3Storage;

use std::pin::Pin;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;
use tracing::info;

use crate::config::{StorageConfig, StorageType};
use crate::range::ByteRange;

/// Storage error types.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("range not satisfiable: {0}")]
    RangeNotSatisfiable(String),

    #[error("invalid object path: {0}")]
    InvalidPath(String),

    #[error("size mismatch for {path}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Stream of object bytes. Dropping it cancels the read.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// Source of bytes for an upload.
pub type ObjectSource = Box<dyn AsyncRead + Send + Unpin>;

/// Operations every backend provides.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open an object, optionally restricted to a byte range.
    async fn get_object(&self, path: &str, range: Option<ByteRange>) -> StorageResult<ObjectReader>;

    /// Stream `reader` into the object at `path`, replacing any existing one.
    ///
    /// `size` is the exact expected length; a stream of any other length
    /// fails with `SizeMismatch` and leaves no object behind.
    async fn put_object(
        &self,
        path: &str,
        size: u64,
        reader: ObjectSource,
        content_type: &str,
    ) -> StorageResult<()>;

    async fn move_object(&self, from: &str, to: &str) -> StorageResult<()>;

    async fn delete_object(&self, path: &str) -> StorageResult<()>;
}

/// The configured backend.
pub enum Storage {
    Local(LocalStorage),
    S3(S3Storage),
}

impl Storage {
    /// Build the backend named by the configuration.
    pub async fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        match config.storage_type {
            StorageType::Local => {
                info!(path = %config.path, "using local object storage");
                Ok(Storage::Local(LocalStorage::new(&config.path).await?))
            }
            StorageType::S3 => {
                info!(endpoint = %config.endpoint, bucket = %config.bucket, "using s3 object storage");
                let storage = S3Storage::connect(config);
                storage.ensure_bucket().await?;
                Ok(Storage::S3(storage))
            }
        }
    }
}

#[async_trait]
impl ObjectStore for Storage {
    async fn get_object(&self, path: &str, range: Option<ByteRange>) -> StorageResult<ObjectReader> {
        match self {
            Storage::Local(s) => s.get_object(path, range).await,
            Storage::S3(s) => s.get_object(path, range).await,
        }
    }

    async fn put_object(
        &self,
        path: &str,
        size: u64,
        reader: ObjectSource,
        content_type: &str,
    ) -> StorageResult<()> {
        match self {
            Storage::Local(s) => s.put_object(path, size, reader, content_type).await,
            Storage::S3(s) => s.put_object(path, size, reader, content_type).await,
        }
    }

    async fn move_object(&self, from: &str, to: &str) -> StorageResult<()> {
        match self {
            Storage::Local(s) => s.move_object(from, to).await,
            Storage::S3(s) => s.move_object(from, to).await,
        }
    }

    async fn delete_object(&self, path: &str) -> StorageResult<()> {
        match self {
            Storage::Local(s) => s.delete_object(path).await,
            Storage::S3(s) => s.delete_object(path).await,
        }
    }
}
