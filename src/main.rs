use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};

use driveshed::web::{AppState, WebServer};
use driveshed::{Config, Database, Storage};

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = driveshed::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        driveshed::logging::init_console_only(&config.logging.level);
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "driveshed stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> driveshed::Result<()> {
    config.validate()?;
    info!("driveshed starting");

    let db = Database::open(&config.database).await?;
    info!(version = db.schema_version().await?, "database ready");

    let storage = Storage::from_config(&config.storage).await?;
    let max_upload = config.server.max_upload_size_mb.saturating_mul(1024 * 1024);
    let state = AppState::new(Arc::new(db), Arc::new(storage), config.auth.clone(), max_upload);

    let server = WebServer::new(&config.server, state)?;
    info!(addr = %server.addr(), "server configured");
    server.run().await?;
    Ok(())
}
