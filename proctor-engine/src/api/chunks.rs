//! Chunk upload endpoint

use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::db::chunks;
use crate::error::{ApiError, ApiResult};
use crate::lock::upload_lock_key;
use crate::queue::Job;
use crate::store::chunk_key;
use crate::AppState;

/// Receive one video chunk: store the media, insert the chunk row, and
/// enqueue it for analysis
///
/// Concurrent uploads for the same session are serialized by the upload
/// guard lock (409 while held). A duplicate (session, index) upload is a
/// silent no-op on the chunk row but may re-enqueue the job, which the
/// worker tolerates (at-least-once).
pub async fn upload_chunk(
    State(state): State<AppState>,
    Path((session_id, chunk_index)): Path<(Uuid, i64)>,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    if chunk_index < 0 {
        return Err(ApiError::BadRequest(
            "chunk_index must be non-negative".to_string(),
        ));
    }

    let guard = state
        .locks
        .acquire(&upload_lock_key(session_id), state.config.upload_lock_ttl())
        .await?
        .ok_or_else(|| ApiError::Conflict("Chunk upload in progress".to_string()))?;

    let outcome = receive_chunk(&state, session_id, chunk_index, multipart).await;

    state.locks.release(&guard).await?;
    outcome
}

async fn receive_chunk(
    state: &AppState,
    session_id: Uuid,
    chunk_index: i64,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let bytes = super::sessions::read_file_field(multipart).await?;

    // Chunk interval follows directly from the fixed chunk duration
    let start_seconds = chunk_index * state.config.chunk_duration_seconds;
    let end_seconds = start_seconds + state.config.chunk_duration_seconds;

    let media_ref = state
        .store
        .put(&chunk_key(session_id, chunk_index), &bytes)
        .await?;

    let inserted = chunks::create_chunk(
        &state.db,
        session_id,
        chunk_index,
        start_seconds,
        end_seconds,
        &media_ref,
    )
    .await?;
    if !inserted {
        debug!(
            "Duplicate upload for session {} chunk {}; ignoring",
            session_id, chunk_index
        );
    }

    state
        .queue
        .enqueue(&Job::new(session_id, chunk_index))
        .await?;

    Ok(Json(json!({
        "status": "uploaded",
        "chunk_index": chunk_index,
        "media_ref": media_ref,
    })))
}
