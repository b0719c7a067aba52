//! API handlers.

pub mod file;
pub mod permission;
pub mod session;
pub mod share;

pub use file::*;
pub use permission::*;
pub use session::*;
pub use share::*;

use std::sync::Arc;

use crate::auth::Resolver;
use crate::config::AuthConfig;
use crate::db::Database;
use crate::file::FileService;
use crate::storage::Storage;

/// Application state shared by all handlers.
pub struct AppState {
    pub db: Arc<Database>,
    pub files: FileService,
    pub auth: AuthConfig,
}

impl AppState {
    /// Create a new application state.
    ///
    /// `max_upload_size` is in bytes, 0 meaning unlimited.
    pub fn new(db: Arc<Database>, storage: Arc<Storage>, auth: AuthConfig, max_upload_size: u64) -> Self {
        let resolver = Resolver::from_config(&auth);
        let files = FileService::new(db.clone(), storage, resolver).with_max_file_size(max_upload_size);
        Self { db, files, auth }
    }
}
