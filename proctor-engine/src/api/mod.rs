//! HTTP API for intake and admin reads
//!
//! Thin layer over the core operations: every endpoint maps directly to
//! one pipeline operation. Processing failures downstream of intake are
//! never surfaced here; they are only observable through the admin
//! projections.

pub mod admin;
pub mod chunks;
pub mod health;
pub mod sessions;

use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

/// Session intake routes
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions/start", post(sessions::start_session))
        .route(
            "/sessions/:session_id/reference-photo",
            post(sessions::upload_reference_photo),
        )
        .route("/sessions/:session_id/end", post(sessions::end_session))
}

/// Chunk upload routes
pub fn chunk_routes() -> Router<AppState> {
    Router::new().route("/chunks/:session_id/:chunk_index", post(chunks::upload_chunk))
}

/// Read-only admin routes
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/sessions", get(admin::list_sessions))
        .route("/admin/sessions/:session_id/events", get(admin::list_events))
        .route("/admin/sessions/:session_id/video", get(admin::final_video))
}

/// Health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health::health))
}
