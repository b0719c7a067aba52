//! Fixtures shared by the file service tests.

use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use super::{CreateRequest, FileService, Upload};
use crate::auth::{Identity, PermissionRecord, Permissions, Resolver};
use crate::db::{Database, PermissionRepository};
use crate::range::ByteRange;
use crate::storage::{
    LocalStorage, ObjectReader, ObjectSource, ObjectStore, StorageError, StorageResult,
};

/// Failures to inject into [`FlakyStore`].
#[derive(Default)]
pub struct Faults {
    fail_puts: bool,
    fail_delete: Option<String>,
    fail_move: Option<String>,
}

impl Faults {
    pub fn failing_puts() -> Self {
        Self {
            fail_puts: true,
            ..Default::default()
        }
    }

    pub fn failing_delete(path: &str) -> Self {
        Self {
            fail_delete: Some(path.to_string()),
            ..Default::default()
        }
    }

    /// Fail moves whose source is `path`.
    pub fn failing_move(path: &str) -> Self {
        Self {
            fail_move: Some(path.to_string()),
            ..Default::default()
        }
    }
}

/// Local storage that fails on demand.
pub struct FlakyStore {
    inner: LocalStorage,
    faults: Faults,
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn get_object(&self, path: &str, range: Option<ByteRange>) -> StorageResult<ObjectReader> {
        self.inner.get_object(path, range).await
    }

    async fn put_object(
        &self,
        path: &str,
        size: u64,
        reader: ObjectSource,
        content_type: &str,
    ) -> StorageResult<()> {
        if self.faults.fail_puts {
            return Err(StorageError::Backend("injected put failure".to_string()));
        }
        self.inner.put_object(path, size, reader, content_type).await
    }

    async fn move_object(&self, from: &str, to: &str) -> StorageResult<()> {
        if self.faults.fail_move.as_deref() == Some(from) {
            return Err(StorageError::Backend("injected move failure".to_string()));
        }
        self.inner.move_object(from, to).await
    }

    async fn delete_object(&self, path: &str) -> StorageResult<()> {
        if self.faults.fail_delete.as_deref() == Some(path) {
            return Err(StorageError::Backend("injected delete failure".to_string()));
        }
        self.inner.delete_object(path).await
    }
}

pub fn user(subject: &str, groups: &[&str]) -> Identity {
    Identity::new(
        subject,
        subject,
        groups.iter().map(|g| g.to_string()).collect(),
        format!("{subject}@example.com"),
        "/",
    )
}

pub fn admin() -> Identity {
    user("root", &["admin"])
}

pub fn upload(data: &'static [u8]) -> Upload {
    Upload::new(data.len() as u64, "", Box::new(data))
}

pub fn upload_vec(data: Vec<u8>) -> Upload {
    Upload::new(data.len() as u64, "", Box::new(std::io::Cursor::new(data)))
}

async fn database() -> Arc<Database> {
    Arc::new(Database::open_in_memory().await.unwrap())
}

pub async fn service() -> (TempDir, FileService<LocalStorage>) {
    let dir = TempDir::new().unwrap();
    let storage = LocalStorage::new(dir.path().join("objects")).await.unwrap();
    let service = FileService::new(database().await, Arc::new(storage), Resolver::new("admin"));
    (dir, service)
}

pub async fn service_with(faults: Faults) -> (TempDir, FileService<FlakyStore>) {
    let dir = TempDir::new().unwrap();
    let inner = LocalStorage::new(dir.path().join("objects")).await.unwrap();
    let storage = FlakyStore { inner, faults };
    let service = FileService::new(database().await, Arc::new(storage), Resolver::new("admin"));
    (dir, service)
}

/// Store a file as the admin.
pub async fn put<S: ObjectStore>(service: &FileService<S>, path: &str, data: &'static [u8]) {
    service
        .create(&admin(), CreateRequest::new(path, upload(data)))
        .await
        .unwrap();
}

/// Attach a user allow record.
pub async fn grant<S: ObjectStore>(
    service: &FileService<S>,
    path: &str,
    subject: &str,
    allow: Permissions,
) {
    PermissionRepository::new(service.database().pool())
        .upsert(&PermissionRecord::user(path, subject, allow, Permissions::NONE))
        .await
        .unwrap();
}
