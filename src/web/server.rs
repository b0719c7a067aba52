//! Web server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;

use super::handlers::AppState;
use super::router::create_router;
use crate::auth::SessionService;
use crate::config::ServerConfig;
use crate::{DriveError, Result};

/// Interval between expired-session sweeps.
const SESSION_CLEANUP_INTERVAL_SECS: u64 = 3600;

/// HTTP server for the drive.
pub struct WebServer {
    addr: SocketAddr,
    app_state: Arc<AppState>,
}

impl WebServer {
    /// Create a new web server.
    pub fn new(config: &ServerConfig, app_state: AppState) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| {
                DriveError::Config(format!(
                    "invalid server address {}:{}: {e}",
                    config.host, config.port
                ))
            })?;
        Ok(Self {
            addr,
            app_state: Arc::new(app_state),
        })
    }

    /// Get the configured address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The full application router.
    pub fn router(&self) -> Router {
        create_router(self.app_state.clone())
    }

    /// Periodically drop expired sessions.
    fn start_session_cleanup_task(state: Arc<AppState>) {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(SESSION_CLEANUP_INTERVAL_SECS));
            // Skip the first immediate tick
            interval.tick().await;

            loop {
                interval.tick().await;
                let sessions = SessionService::new(state.db.pool(), state.auth.session_ttl_secs);
                match sessions.purge_expired().await {
                    Ok(0) => tracing::debug!("no expired sessions to clean up"),
                    Ok(count) => tracing::info!(deleted_count = count, "cleaned up expired sessions"),
                    Err(e) => tracing::warn!(error = %e, "failed to clean up sessions"),
                }
            }
        });
    }

    async fn bind(&self) -> std::io::Result<(TcpListener, SocketAddr)> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        Self::start_session_cleanup_task(self.app_state.clone());
        tracing::info!("web server listening on http://{}", local_addr);
        Ok((listener, local_addr))
    }

    /// Run until ctrl-c.
    pub async fn run(self) -> std::io::Result<()> {
        let (listener, _) = self.bind().await?;
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
    }

    /// Run the server in the background and return the bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> std::io::Result<SocketAddr> {
        let (listener, local_addr) = self.bind().await?;
        let router = self.router();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("web server error: {}", e);
            }
        });
        Ok(local_addr)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::db::Database;
    use crate::storage::{LocalStorage, Storage};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn app_state(dir: &tempfile::TempDir) -> AppState {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        AppState::new(db, Arc::new(Storage::Local(storage)), AuthConfig::default(), 0)
    }

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_web_server_new() {
        let dir = tempfile::tempdir().unwrap();
        let server = WebServer::new(&test_config(), app_state(&dir).await).unwrap();
        assert_eq!(server.addr().ip().to_string(), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            host: "not an address".to_string(),
            ..test_config()
        };
        assert!(matches!(
            WebServer::new(&config, app_state(&dir).await),
            Err(DriveError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_web_server_run() {
        let dir = tempfile::tempdir().unwrap();
        let server = WebServer::new(&test_config(), app_state(&dir).await).unwrap();
        let addr = server.run_with_addr().await.unwrap();

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.to_ascii_lowercase().contains("x-correlation-id"));
        assert!(response.ends_with("OK"));
    }
}
