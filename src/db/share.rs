//! Share repository.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{is_unique_violation, DbPool};
use crate::auth::Permissions;
use crate::{datetime, DriveError, Result};

/// A link granting fixed permissions on a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Share {
    pub id: String,
    pub path: String,
    pub permissions: Permissions,
    /// Issuer.
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// New share for creation.
#[derive(Debug, Clone)]
pub struct NewShare {
    pub id: String,
    pub path: String,
    pub permissions: Permissions,
    pub user_id: String,
}

#[derive(sqlx::FromRow)]
struct ShareRow {
    id: String,
    path: String,
    permissions: i64,
    user_id: String,
    created_at: String,
}

impl ShareRow {
    fn into_share(self) -> Share {
        Share {
            id: self.id,
            path: self.path,
            permissions: Permissions::from_bits(self.permissions),
            user_id: self.user_id,
            created_at: datetime::parse_or_epoch(&self.created_at),
        }
    }
}

/// Repository for share operations.
pub struct ShareRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ShareRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Store a new share. An id collision is reported as a validation error
    /// so the caller can retry with a fresh id.
    pub async fn create(&self, share: &NewShare) -> Result<Share> {
        let inserted = sqlx::query(
            "INSERT INTO shares (id, path, permissions, user_id, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&share.id)
        .bind(&share.path)
        .bind(share.permissions.bits())
        .bind(&share.user_id)
        .bind(datetime::format(&datetime::now()))
        .execute(self.pool)
        .await;

        match inserted {
            Ok(_) => self.get(&share.id).await,
            Err(e) if is_unique_violation(&e) => Err(DriveError::Validation(format!(
                "share id {} already taken",
                share.id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Share> {
        sqlx::query_as::<_, ShareRow>(
            "SELECT id, path, permissions, user_id, created_at FROM shares WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .map(ShareRow::into_share)
        .ok_or_else(|| DriveError::ShareNotFound(id.to_string()))
    }

    /// Delete a share; `ShareNotFound` when nothing was deleted.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM shares WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DriveError::ShareNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Shares issued by a user, newest first.
    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<Share>> {
        let rows = sqlx::query_as::<_, ShareRow>(
            "SELECT id, path, permissions, user_id, created_at FROM shares
             WHERE user_id = $1 ORDER BY created_at DESC, id",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(ShareRow::into_share).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Permission;
    use crate::db::Database;

    fn new_share(id: &str) -> NewShare {
        NewShare {
            id: id.to_string(),
            path: "/docs".to_string(),
            permissions: Permission::Read.into(),
            user_id: "u1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = ShareRepository::new(db.pool());

        let share = repo.create(&new_share("abcd1234")).await.unwrap();
        assert_eq!(share.path, "/docs");
        assert!(share.permissions.has(Permission::Read));
        assert_eq!(repo.get("abcd1234").await.unwrap(), share);

        repo.delete("abcd1234").await.unwrap();
        assert!(matches!(repo.get("abcd1234").await, Err(DriveError::ShareNotFound(_))));
        assert!(matches!(repo.delete("abcd1234").await, Err(DriveError::ShareNotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_id() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = ShareRepository::new(db.pool());
        repo.create(&new_share("same")).await.unwrap();
        assert!(matches!(
            repo.create(&new_share("same")).await,
            Err(DriveError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_list_by_user() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = ShareRepository::new(db.pool());
        repo.create(&new_share("one")).await.unwrap();
        repo.create(&new_share("two")).await.unwrap();
        assert_eq!(repo.list_by_user("u1").await.unwrap().len(), 2);
        assert!(repo.list_by_user("u2").await.unwrap().is_empty());
    }
}
