//! User repository.
//!
//! Users are not registered locally; they are upserted whenever the external
//! identity provider vouches for them.

use serde::Serialize;
use sqlx::QueryBuilder;

use super::{DbKind, DbPool};
use crate::{DriveError, Result};

/// A known user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Identity-provider subject.
    pub id: String,
    pub username: String,
    pub groups: Vec<String>,
    pub email: String,
    /// Directory the user lands in.
    pub home: String,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    username: String,
    group_names: String,
    email: String,
    home: String,
}

impl UserRow {
    fn into_user(self) -> User {
        User {
            id: self.id,
            username: self.username,
            groups: split_groups(&self.group_names),
            email: self.email,
            home: self.home,
        }
    }
}

fn split_groups(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

fn join_groups(groups: &[String]) -> String {
    groups
        .iter()
        .map(|g| g.trim())
        .filter(|g| !g.is_empty() && !g.contains(','))
        .collect::<Vec<_>>()
        .join(",")
}

const USER_COLUMNS: &str = "id, username, group_names, email, home";

/// Repository for user operations.
pub struct UserRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new UserRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert or refresh a user.
    ///
    /// An existing user's home directory is kept.
    pub async fn upsert(&self, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, username, group_names, email, home) VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO UPDATE SET
                username = excluded.username,
                group_names = excluded.group_names,
                email = excluded.email",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(join_groups(&user.groups))
        .bind(&user.email)
        .bind(&user.home)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Get a user by id.
    pub async fn get(&self, id: &str) -> Result<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .map(UserRow::into_user)
            .ok_or_else(|| DriveError::UserNotFound(id.to_string()))
    }

    /// Get a user by username.
    pub async fn get_by_username(&self, username: &str) -> Result<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .fetch_optional(self.pool)
            .await?
            .map(UserRow::into_user)
            .ok_or_else(|| DriveError::UserNotFound(username.to_string()))
    }

    /// Get every user whose id is listed. Unknown ids are skipped.
    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query: QueryBuilder<DbKind> =
            QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users WHERE id IN ("));
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(") ORDER BY username");

        let rows = query
            .build_query_as::<UserRow>()
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(UserRow::into_user).collect())
    }

    /// List all users ordered by username.
    pub async fn list_all(&self) -> Result<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY username");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(UserRow::into_user).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn alice() -> User {
        User {
            id: "sub-alice".to_string(),
            username: "alice".to_string(),
            groups: vec!["staff".to_string(), "dev".to_string()],
            email: "alice@example.com".to_string(),
            home: "/home/alice".to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());

        repo.upsert(&alice()).await.unwrap();
        let user = repo.get("sub-alice").await.unwrap();
        assert_eq!(user, alice());

        let by_name = repo.get_by_username("alice").await.unwrap();
        assert_eq!(by_name.id, "sub-alice");
    }

    #[tokio::test]
    async fn test_upsert_refreshes_but_keeps_home() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());
        repo.upsert(&alice()).await.unwrap();

        let mut changed = alice();
        changed.groups = vec!["admin".to_string()];
        changed.email = "a@corp.example".to_string();
        changed.home = "/elsewhere".to_string();
        repo.upsert(&changed).await.unwrap();

        let user = repo.get("sub-alice").await.unwrap();
        assert_eq!(user.groups, vec!["admin"]);
        assert_eq!(user.email, "a@corp.example");
        assert_eq!(user.home, "/home/alice");
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());
        assert!(matches!(repo.get("nobody").await, Err(DriveError::UserNotFound(_))));
    }

    #[tokio::test]
    async fn test_get_many_and_list() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = UserRepository::new(db.pool());
        repo.upsert(&alice()).await.unwrap();
        let mut bob = alice();
        bob.id = "sub-bob".to_string();
        bob.username = "bob".to_string();
        bob.groups = Vec::new();
        repo.upsert(&bob).await.unwrap();

        let users = repo
            .get_many(&["sub-bob".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(users.len(), 1);
        assert!(users[0].groups.is_empty());

        assert!(repo.get_many(&[]).await.unwrap().is_empty());
        assert_eq!(repo.list_all().await.unwrap().len(), 2);
    }

    #[test]
    fn test_group_encoding() {
        assert_eq!(split_groups(""), Vec::<String>::new());
        assert_eq!(split_groups("a, b,,c"), vec!["a", "b", "c"]);
        assert_eq!(join_groups(&["a".to_string(), "bad,name".to_string()]), "a");
    }
}
