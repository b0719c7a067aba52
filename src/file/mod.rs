//! File operations.
//!
//! [`FileService`] is the only place that touches both the metadata store
//! and the object store. Every mutation begins a metadata transaction, runs
//! the object store operation and commits only when that succeeded.

mod service;
mod share;
#[cfg(test)]
mod testing;

pub use service::{
    BatchReport, BatchWarning, CreateRequest, DirEntry, Download, FileEntry, Listing,
    UpdateRequest, Upload,
};
pub use share::SharedFiles;

use std::sync::Arc;

use crate::auth::Resolver;
use crate::db::Database;
use crate::storage::{ObjectStore, Storage};

/// Default maximum upload size (0 = unlimited).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 0;

/// Length of generated share ids.
pub const SHARE_ID_LENGTH: usize = 8;

/// Orchestrates metadata, object storage and permission checks.
pub struct FileService<S: ObjectStore = Storage> {
    db: Arc<Database>,
    storage: Arc<S>,
    resolver: Resolver,
    max_file_size: u64,
}

impl<S: ObjectStore> FileService<S> {
    /// Create a new FileService.
    pub fn new(db: Arc<Database>, storage: Arc<S>, resolver: Resolver) -> Self {
        Self {
            db,
            storage,
            resolver,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Limit upload sizes (in bytes, 0 = unlimited).
    pub fn with_max_file_size(mut self, max_size: u64) -> Self {
        self.max_file_size = max_size;
        self
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}
