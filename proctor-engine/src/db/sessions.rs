//! Session database operations

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use proctor_common::Result;

use crate::models::{Session, SessionStatus};

fn parse_session_row(row: &sqlx::sqlite::SqliteRow) -> Result<Session> {
    let id: String = row.get("id");
    let id = Uuid::parse_str(&id)
        .map_err(|e| proctor_common::Error::Decode(format!("Failed to parse session id: {}", e)))?;

    let status: String = row.get("status");
    let status = SessionStatus::parse(&status)
        .ok_or_else(|| proctor_common::Error::Decode(format!("Unknown session status: {}", status)))?;

    let started_at: String = row.get("started_at");
    let started_at = chrono::DateTime::parse_from_rfc3339(&started_at)
        .map_err(|e| proctor_common::Error::Decode(format!("Failed to parse started_at: {}", e)))?
        .with_timezone(&Utc);

    let ended_at: Option<String> = row.get("ended_at");
    let ended_at = ended_at
        .map(|s| chrono::DateTime::parse_from_rfc3339(&s))
        .transpose()
        .map_err(|e| proctor_common::Error::Decode(format!("Failed to parse ended_at: {}", e)))?
        .map(|dt| dt.with_timezone(&Utc));

    Ok(Session {
        id,
        exam_id: row.get("exam_id"),
        candidate_id: row.get("candidate_id"),
        status,
        started_at,
        ended_at,
        expected_chunk_count: row.get("expected_chunk_count"),
        processed_chunk_count: row.get("processed_chunk_count"),
        reference_image: row.get("reference_image"),
        final_media: row.get("final_media"),
    })
}

/// Create a new ACTIVE session
pub async fn create_session(
    pool: &SqlitePool,
    session_id: Uuid,
    exam_id: &str,
    candidate_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions (id, exam_id, candidate_id, status, started_at)
        VALUES (?, ?, ?, 'ACTIVE', ?)
        "#,
    )
    .bind(session_id.to_string())
    .bind(exam_id)
    .bind(candidate_id)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load one session
pub async fn get_session(pool: &SqlitePool, session_id: Uuid) -> Result<Option<Session>> {
    let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
        .bind(session_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(parse_session_row).transpose()
}

/// End intake for a session
///
/// Atomically sets the expected chunk count with the ACTIVE → PROCESSING
/// transition. Returns false when the session was not ACTIVE (already ended,
/// already finalized, or unknown), in which case nothing changed.
pub async fn end_session(
    pool: &SqlitePool,
    session_id: Uuid,
    expected_chunk_count: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE sessions
        SET status = 'PROCESSING',
            expected_chunk_count = ?,
            ended_at = ?
        WHERE id = ?
          AND status = 'ACTIVE'
        "#,
    )
    .bind(expected_chunk_count)
    .bind(Utc::now().to_rfc3339())
    .bind(session_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Attach a reference identity image to a session
pub async fn set_reference_image(
    pool: &SqlitePool,
    session_id: Uuid,
    reference: &str,
) -> Result<bool> {
    let result = sqlx::query("UPDATE sessions SET reference_image = ? WHERE id = ?")
        .bind(reference)
        .bind(session_id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Reference image blob reference for a session, if one was uploaded
pub async fn get_reference_image(pool: &SqlitePool, session_id: Uuid) -> Result<Option<String>> {
    let reference: Option<Option<String>> =
        sqlx::query_scalar("SELECT reference_image FROM sessions WHERE id = ?")
            .bind(session_id.to_string())
            .fetch_optional(pool)
            .await?;

    Ok(reference.flatten())
}

/// Record one more chunk having reached PROCESSED, within the chunk's
/// completion transaction
pub async fn increment_processed_count(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    session_id: Uuid,
) -> Result<()> {
    sqlx::query(
        "UPDATE sessions SET processed_chunk_count = processed_chunk_count + 1 WHERE id = ?",
    )
    .bind(session_id.to_string())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Ids of all sessions currently PROCESSING (compactor work list)
pub async fn list_processing(pool: &SqlitePool) -> Result<Vec<Uuid>> {
    let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM sessions WHERE status = 'PROCESSING'")
        .fetch_all(pool)
        .await?;

    parse_ids(ids)
}

/// Ids of PROCESSING sessions whose every expected chunk has been analyzed
///
/// The processed count is compared against the expected count recorded at
/// intake end, so a session with pending or failed analysis is never
/// finalized early.
pub async fn list_finalizable(pool: &SqlitePool) -> Result<Vec<Uuid>> {
    let ids: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT id
        FROM sessions
        WHERE status = 'PROCESSING'
          AND expected_chunk_count IS NOT NULL
          AND processed_chunk_count >= expected_chunk_count
        "#,
    )
    .fetch_all(pool)
    .await?;

    parse_ids(ids)
}

/// Retire a session within the finalize transaction
///
/// Conditional on PROCESSING so a concurrent finalize is a no-op.
pub async fn mark_done(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    session_id: Uuid,
    final_media: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE sessions
        SET status = 'DONE',
            final_media = ?
        WHERE id = ?
          AND status = 'PROCESSING'
        "#,
    )
    .bind(final_media)
    .bind(session_id.to_string())
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// All sessions, most recently started first (admin projection)
pub async fn list_sessions(pool: &SqlitePool) -> Result<Vec<Session>> {
    let rows = sqlx::query("SELECT * FROM sessions ORDER BY started_at DESC")
        .fetch_all(pool)
        .await?;

    rows.iter().map(parse_session_row).collect()
}

fn parse_ids(ids: Vec<String>) -> Result<Vec<Uuid>> {
    ids.into_iter()
        .map(|s| {
            Uuid::parse_str(&s).map_err(|e| {
                proctor_common::Error::Decode(format!("Failed to parse session id: {}", e))
            })
        })
        .collect()
}
