//! klavia-si library interface for testing
//!
//! Exposes public APIs for integration testing

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use std::sync::Arc;

use crate::services::IngestOrchestrator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: sqlx::SqlitePool,
    /// Ingestion pipeline (holds the recognizer, extractor and the
    /// per-score extraction locks)
    pub orchestrator: Arc<IngestOrchestrator>,
}

impl AppState {
    pub fn new(db: sqlx::SqlitePool, orchestrator: Arc<IngestOrchestrator>) -> Self {
        Self { db, orchestrator }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::score_routes())
        .merge(api::health_routes())
        .with_state(state)
}
