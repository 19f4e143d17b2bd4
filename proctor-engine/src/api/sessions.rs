//! Session intake endpoints

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::db::sessions;
use crate::error::{ApiError, ApiResult};
use crate::store::reference_key;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StartParams {
    pub exam_id: String,
    pub candidate_id: String,
}

/// Start a new ACTIVE session
pub async fn start_session(
    State(state): State<AppState>,
    Query(params): Query<StartParams>,
) -> ApiResult<Json<Value>> {
    let session_id = Uuid::new_v4();

    sessions::create_session(&state.db, session_id, &params.exam_id, &params.candidate_id).await?;

    info!(
        "Session {} started (exam {}, candidate {})",
        session_id, params.exam_id, params.candidate_id
    );

    Ok(Json(json!({
        "session_id": session_id,
        "status": "ACTIVE",
    })))
}

/// Upload the candidate's reference identity photo
pub async fn upload_reference_photo(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let bytes = read_file_field(multipart).await?;

    let reference = state.store.put(&reference_key(session_id), &bytes).await?;

    if !sessions::set_reference_image(&state.db, session_id, &reference).await? {
        return Err(ApiError::NotFound(format!("Session {}", session_id)));
    }

    Ok(Json(json!({
        "status": "uploaded",
        "reference": reference,
    })))
}

#[derive(Debug, Deserialize)]
pub struct EndParams {
    pub last_chunk_index: i64,
}

/// End intake: ACTIVE → PROCESSING with the expected chunk count
pub async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Query(params): Query<EndParams>,
) -> ApiResult<Json<Value>> {
    if params.last_chunk_index < 0 {
        return Err(ApiError::BadRequest(
            "last_chunk_index must be non-negative".to_string(),
        ));
    }

    let expected = params.last_chunk_index + 1;
    if !sessions::end_session(&state.db, session_id, expected).await? {
        return Err(ApiError::BadRequest(
            "Session not active or already ended".to_string(),
        ));
    }

    info!("Session {} ended; expecting {} chunks", session_id, expected);

    Ok(Json(json!({
        "status": "processing",
        "expected_chunks": expected,
    })))
}

/// First file field of a multipart upload
pub(crate) async fn read_file_field(mut multipart: Multipart) -> ApiResult<Vec<u8>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.file_name().is_some() || field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;
            return Ok(bytes.to_vec());
        }
    }

    Err(ApiError::BadRequest("Missing file field".to_string()))
}
