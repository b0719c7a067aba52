//! File service: uploads, downloads, edits, moves and deletes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::FileService;
use crate::auth::{Identity, Permission, PermissionRecord, Permissions};
use crate::db::{rollback, DbTransaction, File, FileRepository, NewFile, PermissionRepository};
use crate::path::{self, ROOT};
use crate::range::{self, ByteRange};
use crate::storage::{ObjectReader, ObjectSource, ObjectStore, StorageError};
use crate::{DriveError, Result};

/// Bytes to store.
pub struct Upload {
    /// Exact length of the stream.
    pub size: u64,
    /// MIME type; guessed from the path when empty.
    pub content_type: String,
    pub reader: ObjectSource,
}

impl Upload {
    pub fn new(size: u64, content_type: impl Into<String>, reader: ObjectSource) -> Self {
        Self {
            size,
            content_type: content_type.into(),
            reader,
        }
    }
}

/// Request data for creating a file.
pub struct CreateRequest {
    pub path: String,
    pub description: String,
    /// Replace an existing file instead of failing.
    pub overwrite: bool,
    pub upload: Upload,
}

impl CreateRequest {
    /// Create a new request.
    pub fn new(path: impl Into<String>, upload: Upload) -> Self {
        Self {
            path: path.into(),
            description: String::new(),
            overwrite: false,
            upload,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Allow replacing an existing file.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Changes to an existing file. Unset fields stay as they are.
#[derive(Default)]
pub struct UpdateRequest {
    pub new_path: Option<String>,
    pub description: Option<String>,
    pub content: Option<Upload>,
}

/// An open download.
pub struct Download {
    pub file: File,
    /// The resolved range, when one was requested.
    pub range: Option<ByteRange>,
    pub body: ObjectReader,
}

/// A file with the caller's effective permissions on it.
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    #[serde(flatten)]
    pub file: File,
    pub permissions: Permissions,
}

/// One direct child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    /// Total size of the readable files below this entry.
    pub size: i64,
    pub file_count: usize,
    pub updated_at: DateTime<Utc>,
}

/// A path listing.
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub path: String,
    /// Direct children, directories summarised.
    pub entries: Vec<DirEntry>,
    /// Every readable file at or below the path.
    pub files: Vec<FileEntry>,
}

/// A per-file failure inside a batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchWarning {
    pub path: String,
    pub message: String,
}

/// Outcome of a batch move or delete.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Paths that were moved to or deleted.
    pub succeeded: Vec<String>,
    pub warnings: Vec<BatchWarning>,
}

impl BatchReport {
    fn single(path: String) -> Self {
        Self {
            succeeded: vec![path],
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, path: &str, message: impl Into<String>) {
        let message = message.into();
        warn!(path, %message, "batch item skipped");
        self.warnings.push(BatchWarning {
            path: path.to_string(),
            message,
        });
    }

    /// Whether every selected file was processed.
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}

fn require(perms: Permissions, needed: Permission, path: &str) -> Result<()> {
    if perms.has(needed) {
        Ok(())
    } else {
        Err(DriveError::Unauthorized {
            path: path.to_string(),
            needed,
        })
    }
}

/// Normalize a path that must name a file.
fn file_path(path: &str) -> Result<String> {
    let path = path::normalize(path);
    if path == ROOT {
        return Err(DriveError::Validation("the root cannot be a file".to_string()));
    }
    Ok(path)
}

fn content_type_for(path: &str, given: &str) -> String {
    let given = given.trim();
    if !given.is_empty() {
        return given.to_string();
    }
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Keep the files whose top-level entry below `dir` is listed in `names`.
fn select(files: Vec<File>, dir: &str, names: Option<&[String]>) -> Vec<File> {
    match names {
        Some(names) if !names.is_empty() => files
            .into_iter()
            .filter(|f| {
                path::first_component(&f.path, dir).is_some_and(|n| names.iter().any(|x| x == n))
            })
            .collect(),
        _ => files,
    }
}

fn summarize(dir: &str, files: &[FileEntry]) -> Vec<DirEntry> {
    let mut entries: BTreeMap<&str, DirEntry> = BTreeMap::new();
    for entry in files {
        let file = &entry.file;
        let Some(name) = path::first_component(&file.path, dir) else {
            continue;
        };
        let child = path::join(dir, name);
        let summary = entries.entry(name).or_insert_with(|| DirEntry {
            name: name.to_string(),
            is_dir: child != file.path,
            path: child,
            size: 0,
            file_count: 0,
            updated_at: file.updated_at,
        });
        summary.size += file.size;
        summary.file_count += 1;
        if file.updated_at > summary.updated_at {
            summary.updated_at = file.updated_at;
        }
    }
    entries.into_values().collect()
}

/// Commit after the object store already changed.
///
/// A failure here leaves the two stores disagreeing; it is logged for
/// reconciliation and surfaced, never retried.
async fn commit(tx: DbTransaction, op: &'static str, path: &str) -> Result<()> {
    if let Err(e) = tx.commit().await {
        warn!(
            op,
            path,
            error = %e,
            "metadata commit failed after object store change; stores need reconciliation"
        );
        return Err(e.into());
    }
    Ok(())
}

impl<S: ObjectStore> FileService<S> {
    fn check_size(&self, size: u64) -> Result<()> {
        if self.max_file_size > 0 && size > self.max_file_size {
            return Err(DriveError::Validation(format!(
                "file is too large ({size} bytes, at most {} allowed)",
                self.max_file_size
            )));
        }
        Ok(())
    }

    /// A file may not sit below another file nor replace a directory.
    async fn check_placement(&self, path: &str) -> Result<()> {
        let files = FileRepository::new(self.db.pool());
        let chain = path::ancestors(path);
        if chain.len() > 2 {
            for ancestor in &chain[1..chain.len() - 1] {
                if files.owner_of(ancestor).await?.is_some() {
                    return Err(DriveError::Validation(format!("{ancestor} is a file")));
                }
            }
        }
        if files.find_files(path).await?.iter().any(|f| f.path != path) {
            return Err(DriveError::Validation(format!("{path} is a directory")));
        }
        Ok(())
    }

    /// Effective permissions of `identity` on `path`.
    pub async fn effective_permissions(&self, identity: &Identity, path: &str) -> Result<Permissions> {
        self.resolver
            .file_permissions(self.db.pool(), &path::normalize(path), identity)
            .await
    }

    /// List a file or directory.
    ///
    /// Only files the caller may read are included. A path that holds no
    /// files is `FileNotFound` to callers with `Read` on it and
    /// `Unauthorized` to everyone else; the root lists as empty.
    pub async fn list(&self, identity: &Identity, path: &str) -> Result<Listing> {
        let path = path::normalize(path);
        let pool = self.db.pool();
        let files = FileRepository::new(pool).find_files(&path).await?;
        if files.is_empty() && path != ROOT {
            let perms = self.resolver.file_permissions(pool, &path, identity).await?;
            require(perms, Permission::Read, &path)?;
            return Err(DriveError::FileNotFound(path));
        }

        let perms = self.resolver.files_permissions(pool, &files, identity).await?;
        let total = files.len();
        let readable: Vec<FileEntry> = files
            .into_iter()
            .filter_map(|file| {
                let permissions = perms.get(&file.path).copied().unwrap_or_default();
                permissions
                    .has(Permission::Read)
                    .then_some(FileEntry { file, permissions })
            })
            .collect();
        if total > 0 && readable.is_empty() {
            return Err(DriveError::Unauthorized {
                path,
                needed: Permission::Read,
            });
        }

        debug!(path = %path, total, readable = readable.len(), "listed path");
        Ok(Listing {
            entries: summarize(&path, &readable),
            files: readable,
            path,
        })
    }

    /// Open a file for reading, optionally a byte range of it.
    pub async fn download(
        &self,
        identity: &Identity,
        path: &str,
        range_header: Option<&str>,
    ) -> Result<Download> {
        let path = file_path(path)?;
        let pool = self.db.pool();
        let perms = self.resolver.file_permissions(pool, &path, identity).await?;
        require(perms, Permission::Read, &path)?;
        let file = FileRepository::new(pool).get(&path).await?;
        self.open(file, range_header).await
    }

    pub(super) async fn open(&self, file: File, range_header: Option<&str>) -> Result<Download> {
        let range = range::resolve_header(range_header, file.size.max(0) as u64)?;
        let body = self.storage.get_object(&file.path, range).await?;
        Ok(Download { file, range, body })
    }

    /// Store a new file, or replace one when `overwrite` is set.
    ///
    /// Needs `Create`, or `Update` when replacing an existing file. A failed
    /// upload rolls the metadata back.
    pub async fn create(&self, identity: &Identity, request: CreateRequest) -> Result<File> {
        let path = file_path(&request.path)?;
        let CreateRequest {
            description,
            overwrite,
            upload,
            ..
        } = request;
        self.check_size(upload.size)?;
        self.check_placement(&path).await?;

        let pool = self.db.pool();
        let files = FileRepository::new(pool);
        let exists = match files.get(&path).await {
            Ok(_) => true,
            Err(DriveError::FileNotFound(_)) => false,
            Err(e) => return Err(e),
        };
        let perms = self.resolver.file_permissions(pool, &path, identity).await?;
        if exists && overwrite {
            require(perms, Permission::Update, &path)?;
        } else {
            require(perms, Permission::Create, &path)?;
        }

        let content_type = content_type_for(&path, &upload.content_type);
        let new = NewFile {
            path: path.clone(),
            size: upload.size as i64,
            content_type: content_type.clone(),
            description,
            owner_id: identity.subject.clone(),
        };
        let (file, tx) = if overwrite {
            files.create_or_update(&new).await?
        } else {
            files.create(&new).await?
        };

        let stored = self
            .storage
            .put_object(&path, upload.size, upload.reader, &content_type)
            .await;
        if let Err(e) = stored {
            warn!(path = %path, error = %e, "upload failed, rolling back metadata");
            rollback(tx, "create file").await;
            return Err(e.into());
        }
        commit(tx, "create", &path).await?;

        info!(path = %path, size = file.size, owner = %identity.subject, "file stored");
        Ok(file)
    }

    /// Edit a file's description, replace its content, rename it, or any mix.
    ///
    /// Needs `Update` on the file and `Create` on a new path. New content
    /// under a new path is written first and the old object removed after.
    pub async fn update(&self, identity: &Identity, path: &str, request: UpdateRequest) -> Result<File> {
        let path = file_path(path)?;
        let pool = self.db.pool();
        let files = FileRepository::new(pool);
        let existing = files.get(&path).await?;
        let perms = self.resolver.file_permissions(pool, &path, identity).await?;
        require(perms, Permission::Update, &path)?;

        let new_path = match &request.new_path {
            Some(p) => file_path(p)?,
            None => path.clone(),
        };
        let renamed = new_path != path;
        if renamed {
            self.check_placement(&new_path).await?;
            let dest = self.resolver.file_permissions(pool, &new_path, identity).await?;
            require(dest, Permission::Create, &new_path)?;
        }

        let description = request
            .description
            .unwrap_or_else(|| existing.description.clone());
        let (size, content_type) = match &request.content {
            Some(upload) => {
                if upload.size == 0 {
                    return Err(DriveError::Validation(
                        "replacement content must not be empty".to_string(),
                    ));
                }
                self.check_size(upload.size)?;
                (
                    upload.size as i64,
                    content_type_for(&new_path, &upload.content_type),
                )
            }
            None => (0, existing.content_type.clone()),
        };

        let tx = files
            .update_file(&path, &new_path, size, &content_type, &description)
            .await?;
        let stored = match request.content {
            Some(upload) => {
                self.replace_content(&path, &new_path, upload, &content_type)
                    .await
            }
            None if renamed => self
                .storage
                .move_object(&path, &new_path)
                .await
                .map_err(DriveError::from),
            None => Ok(()),
        };
        if let Err(e) = stored {
            warn!(path = %path, error = %e, "object update failed, rolling back metadata");
            rollback(tx, "update file").await;
            return Err(e);
        }
        commit(tx, "update", &new_path).await?;

        info!(path = %path, new_path = %new_path, "file updated");
        files.get(&new_path).await
    }

    async fn replace_content(
        &self,
        path: &str,
        new_path: &str,
        upload: Upload,
        content_type: &str,
    ) -> Result<()> {
        self.storage
            .put_object(new_path, upload.size, upload.reader, content_type)
            .await?;
        if path != new_path {
            if let Err(e) = self.storage.delete_object(path).await {
                if let Err(undo) = self.storage.delete_object(new_path).await {
                    warn!(path = new_path, error = %undo, "could not remove new object after failed rename");
                }
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Move a file, or the files below a directory, to `to`.
    ///
    /// A single file move is all or nothing. A directory move is best
    /// effort: files the caller may not move, or whose move fails, become
    /// warnings while the rest complete. `names` restricts a directory move
    /// to the listed top-level entries.
    pub async fn move_path(
        &self,
        identity: &Identity,
        from: &str,
        to: &str,
        names: Option<&[String]>,
    ) -> Result<BatchReport> {
        let from = path::normalize(from);
        let to = path::normalize(to);
        if from == to || path::is_descendant(&to, &from) {
            return Err(DriveError::Validation(format!(
                "cannot move {from} into {to}"
            )));
        }

        let pool = self.db.pool();
        let found = FileRepository::new(pool).find_files(&from).await?;
        if found.len() == 1 && found[0].path == from {
            let to = file_path(&to)?;
            self.move_one(identity, &found[0], &to).await?;
            return Ok(BatchReport::single(to));
        }

        let selected = select(found, &from, names);
        if selected.is_empty() {
            return Err(DriveError::FileNotFound(from));
        }

        let targets: Vec<String> = selected
            .iter()
            .map(|f| path::rebase(&f.path, &from, &to).unwrap_or_else(|| f.path.clone()))
            .collect();
        let source_perms = self.resolver.files_permissions(pool, &selected, identity).await?;
        let target_perms = self.resolver.paths_permissions(pool, &targets, identity).await?;

        let mut report = BatchReport::default();
        for (file, target) in selected.iter().zip(targets) {
            let source = source_perms.get(&file.path).copied().unwrap_or_default();
            if let Err(e) = require(source, Permission::Update, &file.path) {
                report.warn(&file.path, e.to_string());
                continue;
            }
            let dest = target_perms.get(&target).copied().unwrap_or_default();
            if let Err(e) = require(dest, Permission::Create, &target) {
                report.warn(&file.path, e.to_string());
                continue;
            }
            if let Err(e) = self.check_placement(&target).await {
                report.warn(&file.path, e.to_string());
                continue;
            }
            match self.relocate(&file.path, &target).await {
                Ok(()) => report.succeeded.push(target),
                Err(e) => report.warn(&file.path, e.to_string()),
            }
        }

        info!(
            from = %from,
            to = %to,
            moved = report.succeeded.len(),
            warnings = report.warnings.len(),
            "batch move finished"
        );
        Ok(report)
    }

    async fn move_one(&self, identity: &Identity, file: &File, to: &str) -> Result<()> {
        let pool = self.db.pool();
        let source = self.resolver.file_permissions(pool, &file.path, identity).await?;
        require(source, Permission::Update, &file.path)?;
        self.check_placement(to).await?;
        let dest = self.resolver.file_permissions(pool, to, identity).await?;
        require(dest, Permission::Create, to)?;
        self.relocate(&file.path, to).await?;
        info!(from = %file.path, to, "file moved");
        Ok(())
    }

    async fn relocate(&self, from: &str, to: &str) -> Result<()> {
        let tx = FileRepository::new(self.db.pool()).move_file(from, to).await?;
        if let Err(e) = self.storage.move_object(from, to).await {
            warn!(from, to, error = %e, "object move failed, rolling back metadata");
            rollback(tx, "move file").await;
            return Err(e.into());
        }
        commit(tx, "move", to).await
    }

    /// Delete a file, or the files below a directory.
    ///
    /// Same all-or-nothing versus best-effort split as [`Self::move_path`].
    /// Deleting below the root needs an explicit `names` list.
    pub async fn delete_path(
        &self,
        identity: &Identity,
        path: &str,
        names: Option<&[String]>,
    ) -> Result<BatchReport> {
        let path = path::normalize(path);
        if path == ROOT && names.map_or(true, |n| n.is_empty()) {
            return Err(DriveError::Validation(
                "deleting from the root needs a list of names".to_string(),
            ));
        }

        let pool = self.db.pool();
        let found = FileRepository::new(pool).find_files(&path).await?;
        if found.len() == 1 && found[0].path == path {
            let perms = self.resolver.file_permissions(pool, &path, identity).await?;
            require(perms, Permission::Delete, &path)?;
            self.remove(&path).await?;
            info!(path = %path, "file deleted");
            return Ok(BatchReport::single(path));
        }

        let selected = select(found, &path, names);
        if selected.is_empty() {
            return Err(DriveError::FileNotFound(path));
        }
        let perms = self.resolver.files_permissions(pool, &selected, identity).await?;

        let mut report = BatchReport::default();
        for file in &selected {
            let allowed = perms.get(&file.path).copied().unwrap_or_default();
            if let Err(e) = require(allowed, Permission::Delete, &file.path) {
                report.warn(&file.path, e.to_string());
                continue;
            }
            match self.remove(&file.path).await {
                Ok(()) => report.succeeded.push(file.path.clone()),
                Err(e) => report.warn(&file.path, e.to_string()),
            }
        }

        info!(
            path = %path,
            deleted = report.succeeded.len(),
            warnings = report.warnings.len(),
            "batch delete finished"
        );
        Ok(report)
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let tx = FileRepository::new(self.db.pool()).delete_file(path).await?;
        match self.storage.delete_object(path).await {
            Ok(()) => {}
            Err(StorageError::NotFound(_)) => {
                warn!(path, "object already missing, dropping metadata anyway");
            }
            Err(e) => {
                warn!(path, error = %e, "object delete failed, rolling back metadata");
                rollback(tx, "delete file").await;
                return Err(e.into());
            }
        }
        commit(tx, "delete", path).await
    }

    /// Permission records attached to exactly `path`. Needs `Read`.
    pub async fn get_permissions(
        &self,
        identity: &Identity,
        path: &str,
    ) -> Result<Vec<PermissionRecord>> {
        let path = path::normalize(path);
        let pool = self.db.pool();
        let perms = self.resolver.file_permissions(pool, &path, identity).await?;
        require(perms, Permission::Read, &path)?;
        PermissionRepository::new(pool).get_for_path(&path).await
    }

    /// Replace the records attached to exactly `path`. Needs
    /// `UpdatePermissions`.
    pub async fn set_permissions(
        &self,
        identity: &Identity,
        path: &str,
        records: Vec<PermissionRecord>,
    ) -> Result<Vec<PermissionRecord>> {
        let path = path::normalize(path);
        let pool = self.db.pool();
        let perms = self.resolver.file_permissions(pool, &path, identity).await?;
        require(perms, Permission::UpdatePermissions, &path)?;

        let records: Vec<PermissionRecord> = records
            .into_iter()
            .map(|mut r| {
                r.path = path::normalize(&r.path);
                r
            })
            .collect();
        let repo = PermissionRepository::new(pool);
        repo.replace_for_path(&path, &records).await?;
        info!(path = %path, count = records.len(), by = %identity.subject, "permissions replaced");
        repo.get_for_path(&path).await
    }
}
