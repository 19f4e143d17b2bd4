//! Read-only admin projections

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::{events, sessions};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub candidate_id: String,
    pub status: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub final_media: Option<String>,
}

/// All sessions, most recent first
pub async fn list_sessions(State(state): State<AppState>) -> ApiResult<Json<Vec<SessionSummary>>> {
    let summaries = sessions::list_sessions(&state.db)
        .await?
        .into_iter()
        .map(|session| SessionSummary {
            id: session.id,
            candidate_id: session.candidate_id,
            status: session.status.as_str().to_string(),
            started_at: session.started_at.to_rfc3339(),
            ended_at: session.ended_at.map(|dt| dt.to_rfc3339()),
            final_media: session.final_media,
        })
        .collect();

    Ok(Json(summaries))
}

/// A session's violation events in chronological order
pub async fn list_events(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<Vec<events::StoredEvent>>> {
    Ok(Json(events::list_events(&state.db, session_id).await?))
}

/// A session's final recording reference
pub async fn final_video(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let session = sessions::get_session(&state.db, session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Session {}", session_id)))?;

    Ok(Json(json!({ "final_media": session.final_media })))
}
