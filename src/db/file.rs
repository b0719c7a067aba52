//! File metadata repository.
//!
//! Every mutating method begins its own transaction and returns it still
//! open. The caller performs the matching object store operation and then
//! commits or rolls back.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::{is_unique_violation, rollback, DbPool, DbTransaction};
use crate::{datetime, path, DriveError, Result};

/// Metadata for one stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct File {
    pub path: String,
    pub size: i64,
    pub content_type: String,
    pub description: String,
    pub owner_id: String,
    /// Username of the owner, when the owner is a known user.
    pub owner_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl File {
    /// Last path segment.
    pub fn name(&self) -> &str {
        path::file_name(&self.path)
    }
}

/// Data for a file row about to be written.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub path: String,
    pub size: i64,
    pub content_type: String,
    pub description: String,
    pub owner_id: String,
}

#[derive(sqlx::FromRow)]
struct FileRow {
    path: String,
    size: i64,
    content_type: String,
    description: String,
    user_id: String,
    username: Option<String>,
    created_at: String,
    updated_at: String,
}

impl FileRow {
    fn into_file(self) -> File {
        File {
            path: self.path,
            size: self.size,
            content_type: self.content_type,
            description: self.description,
            owner_id: self.user_id,
            owner_name: self.username,
            created_at: datetime::parse_or_epoch(&self.created_at),
            updated_at: datetime::parse_or_epoch(&self.updated_at),
        }
    }
}

const SELECT_FILE: &str = "SELECT files.path, files.size, files.content_type, files.description,
        files.user_id, users.username, files.created_at, files.updated_at
     FROM files LEFT JOIN users ON files.user_id = users.id";

/// Repository for file metadata.
pub struct FileRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FileRepository<'a> {
    /// Create a new FileRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Get the file stored at exactly `path`.
    pub async fn get(&self, path: &str) -> Result<File> {
        let sql = format!("{SELECT_FILE} WHERE files.path = $1");
        sqlx::query_as::<_, FileRow>(&sql)
            .bind(path)
            .fetch_optional(self.pool)
            .await?
            .map(FileRow::into_file)
            .ok_or_else(|| DriveError::FileNotFound(path.to_string()))
    }

    /// Owner of the file at exactly `path`, if there is one.
    pub async fn owner_of(&self, path: &str) -> Result<Option<String>> {
        Ok(
            sqlx::query_scalar::<_, String>("SELECT user_id FROM files WHERE path = $1")
                .bind(path)
                .fetch_optional(self.pool)
                .await?,
        )
    }

    /// The file at exactly `path`, or else every file below it.
    pub async fn find_files(&self, path: &str) -> Result<Vec<File>> {
        match self.get(path).await {
            Ok(file) => return Ok(vec![file]),
            Err(DriveError::FileNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let prefix = path::descendant_prefix(path);
        let sql = format!(
            "{SELECT_FILE} WHERE substr(files.path, 1, $2) = $1 ORDER BY files.path"
        );
        let rows = sqlx::query_as::<_, FileRow>(&sql)
            .bind(&prefix)
            .bind(prefix.chars().count() as i32)
            .fetch_all(self.pool)
            .await?;
        debug!(path, count = rows.len(), "found files below path");
        Ok(rows.into_iter().map(FileRow::into_file).collect())
    }

    /// Files owned by a user.
    pub async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<File>> {
        let sql = format!("{SELECT_FILE} WHERE files.user_id = $1 ORDER BY files.path");
        let rows = sqlx::query_as::<_, FileRow>(&sql)
            .bind(owner_id)
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(FileRow::into_file).collect())
    }

    /// Insert a new file row.
    ///
    /// Fails with `FileAlreadyExists` when the unique constraint on `path`
    /// rejects the insert.
    pub async fn create(&self, new: &NewFile) -> Result<(File, DbTransaction)> {
        let mut tx = self.pool.begin().await?;
        let now = datetime::format(&datetime::now());

        let inserted = sqlx::query(
            "INSERT INTO files (path, size, content_type, description, user_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $6)",
        )
        .bind(&new.path)
        .bind(new.size)
        .bind(&new.content_type)
        .bind(&new.description)
        .bind(&new.owner_id)
        .bind(&now)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            rollback(tx, "create file").await;
            if is_unique_violation(&e) {
                return Err(DriveError::FileAlreadyExists(new.path.clone()));
            }
            return Err(e.into());
        }

        let fetched = fetch_in_tx(&mut tx, &new.path).await;
        match fetched {
            Ok(file) => {
                debug!(path = %file.path, size = file.size, "file row inserted");
                Ok((file, tx))
            }
            Err(e) => {
                rollback(tx, "create file").await;
                Err(e)
            }
        }
    }

    /// Insert a file row or replace the content fields of an existing one.
    ///
    /// The existing owner and creation time are kept on conflict.
    pub async fn create_or_update(&self, new: &NewFile) -> Result<(File, DbTransaction)> {
        let mut tx = self.pool.begin().await?;
        let now = datetime::format(&datetime::now());

        let upserted = sqlx::query(
            "INSERT INTO files (path, size, content_type, description, user_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $6)
             ON CONFLICT (path) DO UPDATE SET
                size = excluded.size,
                content_type = excluded.content_type,
                description = excluded.description,
                updated_at = excluded.updated_at",
        )
        .bind(&new.path)
        .bind(new.size)
        .bind(&new.content_type)
        .bind(&new.description)
        .bind(&new.owner_id)
        .bind(&now)
        .execute(&mut *tx)
        .await;

        if let Err(e) = upserted {
            rollback(tx, "create or update file").await;
            return Err(e.into());
        }

        let fetched = fetch_in_tx(&mut tx, &new.path).await;
        match fetched {
            Ok(file) => Ok((file, tx)),
            Err(e) => {
                rollback(tx, "create or update file").await;
                Err(e)
            }
        }
    }

    /// Update a file row, optionally renaming it.
    ///
    /// With `size <= 0` the content fields are left alone and only the path,
    /// description and modification time change. Renaming also re-points
    /// records scoped exactly to the old path.
    pub async fn update_file(
        &self,
        path: &str,
        new_path: &str,
        size: i64,
        content_type: &str,
        description: &str,
    ) -> Result<DbTransaction> {
        let mut tx = self.pool.begin().await?;
        let now = datetime::format(&datetime::now());

        let result = if size > 0 {
            sqlx::query(
                "UPDATE files SET path = $2, size = $3, content_type = $4, description = $5, updated_at = $6
                 WHERE path = $1",
            )
            .bind(path)
            .bind(new_path)
            .bind(size)
            .bind(content_type)
            .bind(description)
            .bind(&now)
            .execute(&mut *tx)
            .await
        } else {
            sqlx::query("UPDATE files SET path = $2, description = $3, updated_at = $4 WHERE path = $1")
                .bind(path)
                .bind(new_path)
                .bind(description)
                .bind(&now)
                .execute(&mut *tx)
                .await
        };

        let affected = match result {
            Ok(done) => done.rows_affected(),
            Err(e) => {
                rollback(tx, "update file").await;
                if is_unique_violation(&e) {
                    return Err(DriveError::FileAlreadyExists(new_path.to_string()));
                }
                return Err(e.into());
            }
        };
        if affected == 0 {
            rollback(tx, "update file").await;
            return Err(DriveError::FileNotFound(path.to_string()));
        }

        if path != new_path {
            let repointed = repoint_permissions(&mut tx, path, new_path).await;
            if let Err(e) = repointed {
                rollback(tx, "update file").await;
                return Err(e);
            }
        }

        debug!(path, new_path, size, "file row updated");
        Ok(tx)
    }

    /// Re-point a file row and its exact-path permission records.
    ///
    /// Ancestor records are left alone, so inherited permissions at the
    /// destination may differ from those at the source.
    pub async fn move_file(&self, path: &str, new_path: &str) -> Result<DbTransaction> {
        let mut tx = self.pool.begin().await?;
        let now = datetime::format(&datetime::now());

        let result = sqlx::query("UPDATE files SET path = $2, updated_at = $3 WHERE path = $1")
            .bind(path)
            .bind(new_path)
            .bind(&now)
            .execute(&mut *tx)
            .await;

        let affected = match result {
            Ok(done) => done.rows_affected(),
            Err(e) => {
                rollback(tx, "move file").await;
                if is_unique_violation(&e) {
                    return Err(DriveError::FileAlreadyExists(new_path.to_string()));
                }
                return Err(e.into());
            }
        };
        if affected == 0 {
            rollback(tx, "move file").await;
            return Err(DriveError::FileNotFound(path.to_string()));
        }

        let repointed = repoint_permissions(&mut tx, path, new_path).await;
        if let Err(e) = repointed {
            rollback(tx, "move file").await;
            return Err(e);
        }

        debug!(path, new_path, "file row moved");
        Ok(tx)
    }

    /// Delete a file row and the permission records scoped exactly to it.
    pub async fn delete_file(&self, path: &str) -> Result<DbTransaction> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM files WHERE path = $1")
            .bind(path)
            .execute(&mut *tx)
            .await;
        let affected = match result {
            Ok(done) => done.rows_affected(),
            Err(e) => {
                rollback(tx, "delete file").await;
                return Err(e.into());
            }
        };
        if affected == 0 {
            rollback(tx, "delete file").await;
            return Err(DriveError::FileNotFound(path.to_string()));
        }

        let dropped = sqlx::query("DELETE FROM permissions WHERE path = $1")
            .bind(path)
            .execute(&mut *tx)
            .await;
        if let Err(e) = dropped {
            rollback(tx, "delete file").await;
            return Err(e.into());
        }

        debug!(path, "file row deleted");
        Ok(tx)
    }
}

async fn fetch_in_tx(tx: &mut DbTransaction, path: &str) -> Result<File> {
    let sql = format!("{SELECT_FILE} WHERE files.path = $1");
    sqlx::query_as::<_, FileRow>(&sql)
        .bind(path)
        .fetch_optional(&mut **tx)
        .await?
        .map(FileRow::into_file)
        .ok_or_else(|| DriveError::FileNotFound(path.to_string()))
}

/// Move exact-path records from `from` to `to`. Records already at `to` for
/// the same principal are replaced.
async fn repoint_permissions(tx: &mut DbTransaction, from: &str, to: &str) -> Result<()> {
    sqlx::query(
        "DELETE FROM permissions WHERE path = $2 AND EXISTS (
            SELECT 1 FROM permissions src
            WHERE src.path = $1
              AND src.object_type = permissions.object_type
              AND src.object_id = permissions.object_id)",
    )
    .bind(from)
    .bind(to)
    .execute(&mut **tx)
    .await?;

    sqlx::query("UPDATE permissions SET path = $2 WHERE path = $1")
        .bind(from)
        .bind(to)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
