//! Shared setup for the HTTP API tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::header::CONTENT_LENGTH;
use axum_test::{TestResponse, TestServer};
use tempfile::TempDir;

use driveshed::auth::{ProviderTokens, SessionService};
use driveshed::config::AuthConfig;
use driveshed::db::{PermissionRepository, User};
use driveshed::storage::{LocalStorage, Storage};
use driveshed::web::{create_router, AppState};
use driveshed::{Database, PermissionRecord, Permissions};

/// Header carrying the session id.
pub const SESSION: &str = "x-session-id";

/// A running test application.
pub struct TestApp {
    pub server: TestServer,
    pub db: Arc<Database>,
    _dir: TempDir,
}

impl TestApp {
    /// Create a test app with an in-memory database and local storage.
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db = Arc::new(
            Database::open_in_memory()
                .await
                .expect("Failed to create test database"),
        );
        let storage = LocalStorage::new(dir.path().join("objects"))
            .await
            .expect("Failed to create storage");
        let state = Arc::new(AppState::new(
            db.clone(),
            Arc::new(Storage::Local(storage)),
            AuthConfig::default(),
            0,
        ));
        let server = TestServer::new(create_router(state)).expect("Failed to create test server");
        Self {
            server,
            db,
            _dir: dir,
        }
    }

    /// Start a session for a user and return its id.
    pub async fn login(&self, subject: &str, groups: &[&str]) -> String {
        let user = User {
            id: subject.to_string(),
            username: subject.to_string(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            email: format!("{subject}@example.com"),
            home: "/".to_string(),
        };
        SessionService::new(self.db.pool(), 3600)
            .start(&user, ProviderTokens::default())
            .await
            .expect("Failed to start session")
            .id
    }

    /// Session id of an admin.
    pub async fn admin(&self) -> String {
        self.login("root", &["admin"]).await
    }

    /// Attach a permission record directly in the store.
    pub async fn grant(&self, record: PermissionRecord) {
        PermissionRepository::new(self.db.pool())
            .upsert(&record)
            .await
            .expect("Failed to store permission record");
    }

    /// Upload bytes as the given session.
    pub async fn upload(&self, session: &str, path: &str, data: &[u8]) -> TestResponse {
        self.server
            .put(&format!("/files{path}"))
            .add_header(SESSION, session.to_string())
            .add_header(CONTENT_LENGTH, data.len().to_string())
            .bytes(Bytes::copy_from_slice(data))
            .await
    }
}

/// Allow-only record for a user.
pub fn allow_user(path: &str, subject: &str, allow: Permissions) -> PermissionRecord {
    PermissionRecord::user(path, subject, allow, Permissions::NONE)
}
