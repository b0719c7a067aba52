//! Session repository.

use chrono::{DateTime, Utc};

use super::DbPool;
use crate::{datetime, DriveError, Result};

/// A login session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub id_token: String,
    pub expiry: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}

/// New session for creation.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: String,
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub id_token: String,
    pub expiry: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    access_token: String,
    refresh_token: String,
    id_token: String,
    expiry: String,
}

impl SessionRow {
    fn into_session(self) -> Session {
        Session {
            id: self.id,
            user_id: self.user_id,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            id_token: self.id_token,
            expiry: datetime::parse_or_epoch(&self.expiry),
        }
    }
}

/// Repository for session operations.
pub struct SessionRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> SessionRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Store a new session.
    pub async fn create(&self, session: &NewSession) -> Result<Session> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, access_token, refresh_token, id_token, expiry)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.access_token)
        .bind(&session.refresh_token)
        .bind(&session.id_token)
        .bind(datetime::format(&session.expiry))
        .execute(self.pool)
        .await?;
        self.get(&session.id).await
    }

    /// Get a session by id, expired or not.
    pub async fn get(&self, id: &str) -> Result<Session> {
        sqlx::query_as::<_, SessionRow>(
            "SELECT id, user_id, access_token, refresh_token, id_token, expiry
             FROM sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .map(SessionRow::into_session)
        .ok_or(DriveError::SessionNotFound)
    }

    /// Delete a session. Deleting an unknown id is not an error.
    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Delete every session that expired before `now`.
    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expiry <= $1")
            .bind(datetime::format(&now))
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::Duration;

    fn new_session(id: &str, expiry: DateTime<Utc>) -> NewSession {
        NewSession {
            id: id.to_string(),
            user_id: "u1".to_string(),
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            id_token: "it".to_string(),
            expiry,
        }
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = SessionRepository::new(db.pool());
        let expiry = datetime::now() + Duration::hours(1);

        let session = repo.create(&new_session("s1", expiry)).await.unwrap();
        assert_eq!(session.user_id, "u1");
        assert_eq!(session.expiry, expiry);
        assert!(!session.is_expired(datetime::now()));

        repo.delete("s1").await.unwrap();
        assert!(matches!(repo.get("s1").await, Err(DriveError::SessionNotFound)));
        repo.delete("s1").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = SessionRepository::new(db.pool());
        let now = datetime::now();
        repo.create(&new_session("old", now - Duration::minutes(5)))
            .await
            .unwrap();
        repo.create(&new_session("fresh", now + Duration::minutes(5)))
            .await
            .unwrap();

        assert_eq!(repo.delete_expired(now).await.unwrap(), 1);
        assert!(repo.get("fresh").await.is_ok());
    }
}
