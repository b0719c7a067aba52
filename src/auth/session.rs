//! Session lifecycle.
//!
//! Sessions are rows in the metadata store; there is no in-process session
//! map. Verifying the identity behind tokens is the job of the external
//! identity provider, so this service only records and resolves sessions.

use chrono::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::Identity;
use crate::db::{DbPool, NewSession, Session, SessionRepository, User, UserRepository};
use crate::{datetime, DriveError, Result};

/// Tokens issued by the identity provider at login.
#[derive(Debug, Clone, Default)]
pub struct ProviderTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub id_token: String,
}

/// Creates, resolves and ends sessions.
pub struct SessionService<'a> {
    pool: &'a DbPool,
    /// `None` when the configured lifetime does not fit a `Duration`.
    ttl: Option<Duration>,
}

impl<'a> SessionService<'a> {
    pub fn new(pool: &'a DbPool, ttl_secs: u64) -> Self {
        Self {
            pool,
            ttl: i64::try_from(ttl_secs).ok().and_then(Duration::try_seconds),
        }
    }

    /// Record a verified login: upsert the user, then open a session.
    pub async fn start(&self, user: &User, tokens: ProviderTokens) -> Result<Session> {
        let expiry = self
            .ttl
            .and_then(|ttl| datetime::now().checked_add_signed(ttl))
            .ok_or_else(|| DriveError::Config("session lifetime is out of range".to_string()))?;
        UserRepository::new(self.pool).upsert(user).await?;

        let session = SessionRepository::new(self.pool)
            .create(&NewSession {
                id: Uuid::new_v4().to_string(),
                user_id: user.id.clone(),
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
                id_token: tokens.id_token,
                expiry,
            })
            .await?;
        info!(user = %user.username, "session started");
        Ok(session)
    }

    /// Identity behind a session.
    ///
    /// Missing and expired sessions both yield `SessionNotFound`; expired
    /// rows are removed on the way.
    pub async fn identity(&self, session_id: &str) -> Result<Identity> {
        let sessions = SessionRepository::new(self.pool);
        let session = sessions.get(session_id).await?;
        if session.is_expired(datetime::now()) {
            debug!(session = session_id, "session expired");
            sessions.delete(session_id).await?;
            return Err(DriveError::SessionNotFound);
        }

        match UserRepository::new(self.pool).get(&session.user_id).await {
            Ok(user) => Ok(Identity::from(user)),
            Err(DriveError::UserNotFound(_)) => {
                sessions.delete(session_id).await?;
                Err(DriveError::SessionNotFound)
            }
            Err(e) => Err(e),
        }
    }

    /// End a session.
    pub async fn end(&self, session_id: &str) -> Result<()> {
        SessionRepository::new(self.pool).delete(session_id).await?;
        debug!(session = session_id, "session ended");
        Ok(())
    }

    /// Drop every expired session.
    pub async fn purge_expired(&self) -> Result<u64> {
        SessionRepository::new(self.pool)
            .delete_expired(datetime::now())
            .await
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
            groups: vec!["staff".to_string()],
            email: "alice@example.com".to_string(),
            home: "/home/alice".to_string(),
        }
    }

    #[tokio::test]
    async fn test_start_and_resolve() {
        let db = Database::open_in_memory().await.unwrap();
        let service = SessionService::new(db.pool(), 3600);

        let session = service.start(&alice(), ProviderTokens::default()).await.unwrap();
        let identity = service.identity(&session.id).await.unwrap();
        assert_eq!(identity.subject, "sub-alice");
        assert!(identity.in_group("staff"));

        service.end(&session.id).await.unwrap();
        assert!(matches!(
            service.identity(&session.id).await,
            Err(DriveError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn test_expired_session_is_removed() {
        let db = Database::open_in_memory().await.unwrap();
        let service = SessionService::new(db.pool(), 0);

        let session = service.start(&alice(), ProviderTokens::default()).await.unwrap();
        assert!(matches!(
            service.identity(&session.id).await,
            Err(DriveError::SessionNotFound)
        ));
        assert!(SessionRepository::new(db.pool()).get(&session.id).await.is_err());
    }

    #[tokio::test]
    async fn test_out_of_range_lifetime() {
        let db = Database::open_in_memory().await.unwrap();
        let service = SessionService::new(db.pool(), u64::MAX);
        assert!(matches!(
            service.start(&alice(), ProviderTokens::default()).await,
            Err(DriveError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let db = Database::open_in_memory().await.unwrap();
        let service = SessionService::new(db.pool(), 3600);
        assert!(matches!(
            service.identity("nope").await,
            Err(DriveError::SessionNotFound)
        ));
        assert_eq!(service.purge_expired().await.unwrap(), 0);
    }
}
