//! klavia-si - Score Ingest Microservice
//!
//! Ingests scanned sheet-music PDFs, drives the external OMR engine to a
//! validated score archive, flattens the score into the game's note-event
//! sequence and persists the result.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use klavia_si::config::SiConfig;
use klavia_si::services::{AudiverisClient, IngestOrchestrator};
use klavia_si::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting klavia-si (Score Ingest) microservice");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Step 1: Resolve storage root and make sure its layout exists
    let root = klavia_common::config::resolve_root_folder(None, "KLAVIA_ROOT_FOLDER");
    klavia_common::config::ensure_root_layout(&root)
        .map_err(|e| anyhow::anyhow!("Failed to initialize root folder: {}", e))?;
    info!("Storage root: {}", root.display());

    // Step 2: Open or create database
    let db_path = klavia_common::config::database_path(&root);
    info!("Database: {}", db_path.display());
    let db_pool = klavia_si::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    // Step 3: Resolve recognizer configuration (ENV → TOML → default)
    let toml_config =
        klavia_common::config::load_toml_config(&klavia_common::config::default_config_path()).ok();
    let config = SiConfig::resolve(toml_config.as_ref());

    let recognizer = AudiverisClient::new(&config);
    if recognizer.is_available() {
        info!(binary = %config.recognizer_bin.display(), "Recognition engine available");
    } else {
        warn!(
            binary = %config.recognizer_bin.display(),
            "Recognition engine not reachable - uploads will fail until it is installed"
        );
    }

    // Create application state
    let orchestrator = Arc::new(IngestOrchestrator::new(
        db_pool.clone(),
        Arc::new(recognizer),
        root,
    ));
    let state = AppState::new(db_pool, orchestrator);

    // Build router
    let app = klavia_si::build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind("127.0.0.1:5731").await?;
    info!("Listening on http://127.0.0.1:5731");
    info!("Health check: http://127.0.0.1:5731/health");

    axum::serve(listener, app).await?;

    Ok(())
}
