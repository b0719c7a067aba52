//! Database module for driveshed.
//!
//! Metadata lives in SQLite (default feature) or PostgreSQL through a sqlx
//! pool. Repositories borrow the pool; mutating file operations hand back an
//! open transaction so the caller can pair them with object store work.

mod file;
mod permission;
mod schema;
mod session;
mod share;
mod user;

pub use file::{File, FileRepository, NewFile};
pub use permission::PermissionRepository;
pub use schema::MIGRATIONS;
pub use session::{NewSession, Session, SessionRepository};
pub use share::{NewShare, Share, ShareRepository};
pub use user::{User, UserRepository};

use tracing::{debug, info, warn};

use crate::config::{DatabaseConfig, DatabaseType};
use crate::{datetime, DriveError, Result};

#[cfg(feature = "sqlite")]
pub type DbKind = sqlx::Sqlite;
#[cfg(all(feature = "postgres", not(feature = "sqlite")))]
pub type DbKind = sqlx::Postgres;

/// Connection pool for the compiled-in backend.
pub type DbPool = sqlx::Pool<DbKind>;

/// An open metadata transaction.
pub type DbTransaction = sqlx::Transaction<'static, DbKind>;

/// Whether an error is a unique constraint violation.
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Roll back, logging instead of failing when the rollback itself errors.
pub(crate) async fn rollback(tx: DbTransaction, context: &str) {
    if let Err(e) = tx.rollback().await {
        warn!(context, error = %e, "transaction rollback failed");
    } else {
        debug!(context, "transaction rolled back");
    }
}

/// Database wrapper owning the pool and applying migrations.
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Connect using the configured backend and apply migrations.
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        let pool = Self::connect(config).await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    #[cfg(feature = "sqlite")]
    async fn connect(config: &DatabaseConfig) -> Result<DbPool> {
        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
        use std::path::Path;
        use std::str::FromStr;
        use std::time::Duration;

        if config.db_type != DatabaseType::Sqlite {
            return Err(DriveError::Config(
                "this build supports database.type = \"sqlite\" only".to_string(),
            ));
        }
        info!("Opening database at {}", config.path);
        if let Some(parent) = Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&config.connection_url())?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);
        Ok(SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?)
    }

    #[cfg(all(feature = "postgres", not(feature = "sqlite")))]
    async fn connect(config: &DatabaseConfig) -> Result<DbPool> {
        use sqlx::postgres::PgPoolOptions;

        if config.db_type != DatabaseType::Postgres {
            return Err(DriveError::Config(
                "this build supports database.type = \"postgres\" only".to_string(),
            ));
        }
        info!(
            "Connecting to postgres at {}:{}/{}",
            config.host, config.port, config.database
        );
        Ok(PgPoolOptions::new()
            .max_connections(16)
            .connect(&config.connection_url())
            .await?)
    }

    /// Open an in-memory database for testing.
    ///
    /// The pool holds a single connection so every query sees the same
    /// database; never query the pool while holding a transaction from it.
    #[cfg(feature = "sqlite")]
    pub async fn open_in_memory() -> Result<Self> {
        use sqlx::sqlite::SqlitePoolOptions;

        debug!("Opening in-memory database");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get a reference to the pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Begin a new transaction.
    pub async fn begin(&self) -> Result<DbTransaction> {
        Ok(self.pool.begin().await?)
    }

    /// Close all connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Get the current schema version.
    pub async fn schema_version(&self) -> Result<i64> {
        if !self.table_exists("schema_version").await? {
            return Ok(0);
        }
        let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(version.unwrap_or(0))
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        let current_version = self.schema_version().await?;
        if current_version as usize >= MIGRATIONS.len() {
            debug!("Database is up to date (version {})", current_version);
            return Ok(());
        }

        info!(
            "Migrating database from version {} to {}",
            current_version,
            MIGRATIONS.len()
        );

        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version     BIGINT PRIMARY KEY,
                applied_at  TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        for (i, migration) in MIGRATIONS.iter().enumerate().skip(current_version as usize) {
            let version = (i + 1) as i64;
            info!("Applying migration v{}", version);

            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(migration).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES ($1, $2)")
                .bind(version)
                .bind(datetime::format(&datetime::now()))
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }

        info!(
            "Database migration complete (now at version {})",
            MIGRATIONS.len()
        );
        Ok(())
    }

    /// Check if a table exists.
    pub async fn table_exists(&self, table_name: &str) -> Result<bool> {
        #[cfg(feature = "sqlite")]
        let sql = "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = $1";
        #[cfg(all(feature = "postgres", not(feature = "sqlite")))]
        let sql = "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = $1";

        let count: i64 = sqlx::query_scalar(sql)
            .bind(table_name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = Database::open_in_memory().await.unwrap();
        assert_eq!(db.schema_version().await.unwrap(), MIGRATIONS.len() as i64);
    }

    #[tokio::test]
    async fn test_tables_created() {
        let db = Database::open_in_memory().await.unwrap();
        for table in ["users", "files", "permissions", "sessions", "shares"] {
            assert!(db.table_exists(table).await.unwrap(), "{table} missing");
        }
        assert!(!db.table_exists("nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        assert_eq!(db.schema_version().await.unwrap(), MIGRATIONS.len() as i64);
    }

    #[tokio::test]
    async fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested/drive.db").to_string_lossy().into_owned(),
            ..Default::default()
        };
        let db = Database::open(&config).await.unwrap();
        assert!(db.table_exists("files").await.unwrap());
        db.close().await;
    }
}
