//! Proctoring chunk lifecycle pipeline
//!
//! Ingests exam-session video as small time-ordered chunks, analyzes each
//! chunk for proctoring violations, and incrementally compacts processed
//! chunks into one final recording. The intake server and the three
//! worker binaries all link this library and share one root folder.

pub mod analysis;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod lock;
pub mod media;
pub mod models;
pub mod queue;
pub mod store;
pub mod workers;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::EngineConfig;
use crate::lock::LockManager;
use crate::queue::JobQueue;
use crate::store::BlobStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Chunk-processing job queue
    pub queue: JobQueue,
    /// Shared lock key space (upload guards, session mutexes)
    pub locks: LockManager,
    /// Durable media storage
    pub store: Arc<dyn BlobStore>,
    /// Engine settings
    pub config: EngineConfig,
}

impl AppState {
    pub fn new(db: SqlitePool, store: Arc<dyn BlobStore>, config: EngineConfig) -> Self {
        Self {
            queue: JobQueue::new(db.clone()),
            locks: LockManager::new(db.clone()),
            db,
            store,
            config,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::session_routes())
        .merge(api::chunk_routes())
        .merge(api::admin_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
