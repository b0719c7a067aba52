//! Permission record repository.

use sqlx::QueryBuilder;
use tracing::debug;

use super::{rollback, DbKind, DbPool};
use crate::auth::{ObjectType, PermissionRecord, Permissions};
use crate::{DriveError, Result};

#[derive(sqlx::FromRow)]
struct PermissionRow {
    path: String,
    allow_mask: i64,
    deny_mask: i64,
    object_type: String,
    object_id: String,
}

impl PermissionRow {
    fn into_record(self) -> Result<PermissionRecord> {
        let object_type = self
            .object_type
            .parse::<ObjectType>()
            .map_err(DriveError::Database)?;
        Ok(PermissionRecord {
            path: self.path,
            allow: Permissions::from_bits(self.allow_mask),
            deny: Permissions::from_bits(self.deny_mask),
            object_type,
            object_id: self.object_id,
        })
    }
}

fn into_records(rows: Vec<PermissionRow>) -> Result<Vec<PermissionRecord>> {
    rows.into_iter().map(PermissionRow::into_record).collect()
}

/// Everyone records carry no object id.
fn object_id_for(object_type: ObjectType, object_id: &str) -> &str {
    match object_type {
        ObjectType::Everyone => "",
        _ => object_id,
    }
}

const PERMISSION_COLUMNS: &str = "path, allow_mask, deny_mask, object_type, object_id";

/// Repository for permission records.
pub struct PermissionRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> PermissionRepository<'a> {
    /// Create a new PermissionRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// All records attached to any of `paths`.
    pub async fn get_for_paths(&self, paths: &[String]) -> Result<Vec<PermissionRecord>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let mut query: QueryBuilder<DbKind> = QueryBuilder::new(format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE path IN ("
        ));
        let mut separated = query.separated(", ");
        for path in paths {
            separated.push_bind(path);
        }
        separated.push_unseparated(")");

        let rows = query
            .build_query_as::<PermissionRow>()
            .fetch_all(self.pool)
            .await?;
        into_records(rows)
    }

    /// Records attached to exactly `path`.
    pub async fn get_for_path(&self, path: &str) -> Result<Vec<PermissionRecord>> {
        let sql = format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE path = $1
             ORDER BY object_type, object_id"
        );
        let rows = sqlx::query_as::<_, PermissionRow>(&sql)
            .bind(path)
            .fetch_all(self.pool)
            .await?;
        into_records(rows)
    }

    /// Every record.
    pub async fn get_all(&self) -> Result<Vec<PermissionRecord>> {
        let sql = format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions ORDER BY path, object_type, object_id"
        );
        let rows = sqlx::query_as::<_, PermissionRow>(&sql)
            .fetch_all(self.pool)
            .await?;
        into_records(rows)
    }

    /// Insert a record or replace the masks of the existing one for the
    /// same path and principal.
    pub async fn upsert(&self, record: &PermissionRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO permissions (path, allow_mask, deny_mask, object_type, object_id)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (path, object_type, object_id) DO UPDATE SET
                allow_mask = excluded.allow_mask,
                deny_mask = excluded.deny_mask",
        )
        .bind(&record.path)
        .bind(record.allow.bits())
        .bind(record.deny.bits())
        .bind(record.object_type.as_str())
        .bind(object_id_for(record.object_type, &record.object_id))
        .execute(self.pool)
        .await?;
        debug!(
            path = %record.path,
            object_type = %record.object_type,
            object_id = %record.object_id,
            allow = %record.allow,
            deny = %record.deny,
            "permission record upserted"
        );
        Ok(())
    }

    /// Delete the record for one principal on one path.
    pub async fn delete(&self, path: &str, object_type: ObjectType, object_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM permissions WHERE path = $1 AND object_type = $2 AND object_id = $3",
        )
        .bind(path)
        .bind(object_type.as_str())
        .bind(object_id_for(object_type, object_id))
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every record on `path`.
    pub async fn delete_for_path(&self, path: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM permissions WHERE path = $1")
            .bind(path)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete every record for one principal, on any path.
    pub async fn delete_for_object(&self, object_type: ObjectType, object_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM permissions WHERE object_type = $1 AND object_id = $2")
            .bind(object_type.as_str())
            .bind(object_id_for(object_type, object_id))
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Atomically replace the records on `path` with `records`.
    ///
    /// Every record must be scoped to `path`.
    pub async fn replace_for_path(&self, path: &str, records: &[PermissionRecord]) -> Result<()> {
        if let Some(stray) = records.iter().find(|r| r.path != path) {
            return Err(DriveError::Validation(format!(
                "record for {} does not belong to {path}",
                stray.path
            )));
        }

        let mut tx = self.pool.begin().await?;
        let cleared = sqlx::query("DELETE FROM permissions WHERE path = $1")
            .bind(path)
            .execute(&mut *tx)
            .await;
        if let Err(e) = cleared {
            rollback(tx, "replace permissions").await;
            return Err(e.into());
        }

        for record in records {
            let inserted = sqlx::query(
                "INSERT INTO permissions (path, allow_mask, deny_mask, object_type, object_id)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (path, object_type, object_id) DO UPDATE SET
                    allow_mask = excluded.allow_mask,
                    deny_mask = excluded.deny_mask",
            )
            .bind(path)
            .bind(record.allow.bits())
            .bind(record.deny.bits())
            .bind(record.object_type.as_str())
            .bind(object_id_for(record.object_type, &record.object_id))
            .execute(&mut *tx)
            .await;
            if let Err(e) = inserted {
                rollback(tx, "replace permissions").await;
                return Err(e.into());
            }
        }

        tx.commit().await?;
        debug!(path, count = records.len(), "permission records replaced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Permission;
    use crate::db::Database;

    fn read() -> Permissions {
        Permission::Read.into()
    }

    #[tokio::test]
    async fn test_upsert_replaces_masks() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = PermissionRepository::new(db.pool());

        repo.upsert(&PermissionRecord::group("/a", "staff", read(), Permissions::NONE))
            .await
            .unwrap();
        repo.upsert(&PermissionRecord::group("/a", "staff", Permissions::NONE, read()))
            .await
            .unwrap();

        let records = repo.get_for_path("/a").await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].allow.is_empty());
        assert_eq!(records[0].deny, read());
    }

    #[tokio::test]
    async fn test_everyone_ignores_object_id() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = PermissionRepository::new(db.pool());
        let mut record = PermissionRecord::everyone("/", read(), Permissions::NONE);
        record.object_id = "ignored".to_string();
        repo.upsert(&record).await.unwrap();
        repo.upsert(&PermissionRecord::everyone("/", Permissions::ALL, Permissions::NONE))
            .await
            .unwrap();

        let records = repo.get_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].object_id, "");
        assert_eq!(records[0].allow, Permissions::ALL);
    }

    #[tokio::test]
    async fn test_get_for_paths() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = PermissionRepository::new(db.pool());
        for path in ["/", "/a", "/a/b", "/z"] {
            repo.upsert(&PermissionRecord::everyone(path, read(), Permissions::NONE))
                .await
                .unwrap();
        }

        let chain = vec!["/".to_string(), "/a".to_string(), "/a/b".to_string()];
        assert_eq!(repo.get_for_paths(&chain).await.unwrap().len(), 3);
        assert!(repo.get_for_paths(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deletes() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = PermissionRepository::new(db.pool());
        repo.upsert(&PermissionRecord::user("/a", "u1", read(), Permissions::NONE))
            .await
            .unwrap();
        repo.upsert(&PermissionRecord::user("/b", "u1", read(), Permissions::NONE))
            .await
            .unwrap();
        repo.upsert(&PermissionRecord::group("/a", "staff", read(), Permissions::NONE))
            .await
            .unwrap();

        assert!(repo.delete("/a", ObjectType::Group, "staff").await.unwrap());
        assert!(!repo.delete("/a", ObjectType::Group, "staff").await.unwrap());
        assert_eq!(repo.delete_for_object(ObjectType::User, "u1").await.unwrap(), 2);
        assert_eq!(repo.delete_for_path("/a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replace_for_path() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = PermissionRepository::new(db.pool());
        repo.upsert(&PermissionRecord::user("/a", "u1", read(), Permissions::NONE))
            .await
            .unwrap();

        repo.replace_for_path(
            "/a",
            &[
                PermissionRecord::group("/a", "staff", Permissions::ALL, Permissions::NONE),
                PermissionRecord::everyone("/a", read(), Permissions::NONE),
            ],
        )
        .await
        .unwrap();

        let records = repo.get_for_path("/a").await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.object_type != ObjectType::User));

        let stray = repo
            .replace_for_path("/a", &[PermissionRecord::everyone("/b", read(), Permissions::NONE)])
            .await;
        assert!(matches!(stray, Err(DriveError::Validation(_))));
        assert_eq!(repo.get_for_path("/a").await.unwrap().len(), 2);
    }
}
