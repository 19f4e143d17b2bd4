//! Chunk database operations
//!
//! Status updates are conditional on the current status so that retried
//! jobs and concurrent workers cannot regress a chunk's lifecycle.

use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;
use proctor_common::Result;

use crate::models::{Chunk, ChunkStatus, AGGREGATE_CHUNK_INDEX};

fn parse_chunk_row(row: &sqlx::sqlite::SqliteRow) -> Result<Chunk> {
    let session_id: String = row.get("session_id");
    let session_id = Uuid::parse_str(&session_id)
        .map_err(|e| proctor_common::Error::Decode(format!("Failed to parse session id: {}", e)))?;

    let status: String = row.get("status");
    let status = ChunkStatus::parse(&status)
        .ok_or_else(|| proctor_common::Error::Decode(format!("Unknown chunk status: {}", status)))?;

    Ok(Chunk {
        id: row.get("id"),
        session_id,
        chunk_index: row.get("chunk_index"),
        start_seconds: row.get("start_seconds"),
        end_seconds: row.get("end_seconds"),
        media_ref: row.get("media_ref"),
        status,
        attempts: row.get("attempts"),
    })
}

/// Insert an uploaded chunk as RECEIVED
///
/// A duplicate upload of the same (session, index) is a silent no-op, so
/// client retries never produce a second row. Returns whether a row was
/// actually inserted.
pub async fn create_chunk(
    pool: &SqlitePool,
    session_id: Uuid,
    chunk_index: i64,
    start_seconds: i64,
    end_seconds: i64,
    media_ref: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO chunks (session_id, chunk_index, start_seconds, end_seconds, media_ref, status)
        VALUES (?, ?, ?, ?, ?, 'RECEIVED')
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(session_id.to_string())
    .bind(chunk_index)
    .bind(start_seconds)
    .bind(end_seconds)
    .bind(media_ref)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Load one original chunk
pub async fn get_chunk(
    pool: &SqlitePool,
    session_id: Uuid,
    chunk_index: i64,
) -> Result<Option<Chunk>> {
    let row = sqlx::query("SELECT * FROM chunks WHERE session_id = ? AND chunk_index = ?")
        .bind(session_id.to_string())
        .bind(chunk_index)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(parse_chunk_row).transpose()
}

/// Transition a chunk to PROCESSING
///
/// No-op for a missing row and for a chunk that already reached PROCESSED
/// or DEAD, so a redelivered job can never cause re-analysis. Returns
/// whether the transition happened.
pub async fn mark_processing(
    pool: &SqlitePool,
    session_id: Uuid,
    chunk_index: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE chunks
        SET status = 'PROCESSING'
        WHERE session_id = ? AND chunk_index = ?
          AND status IN ('RECEIVED', 'PROCESSING', 'FAILED')
        "#,
    )
    .bind(session_id.to_string())
    .bind(chunk_index)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Transition a chunk PROCESSING → PROCESSED within the completion
/// transaction, alongside its events and the session's processed count
pub async fn mark_processed(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: Uuid,
    chunk_index: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE chunks
        SET status = 'PROCESSED'
        WHERE session_id = ? AND chunk_index = ?
          AND status = 'PROCESSING'
        "#,
    )
    .bind(session_id.to_string())
    .bind(chunk_index)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Record an analysis failure and bump the attempt counter
///
/// Only a chunk still in PROCESSING can fail; a chunk that reached
/// PROCESSED stays there, so a late error on the worker's bookkeeping path
/// can never regress an already-analyzed chunk into another analysis.
/// Returns the new attempt count, or `None` when the chunk was not in
/// PROCESSING and nothing changed.
pub async fn mark_failed(
    pool: &SqlitePool,
    session_id: Uuid,
    chunk_index: i64,
) -> Result<Option<i64>> {
    let attempts: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE chunks
        SET status = 'FAILED', attempts = attempts + 1
        WHERE session_id = ? AND chunk_index = ?
          AND status = 'PROCESSING'
        RETURNING attempts
        "#,
    )
    .bind(session_id.to_string())
    .bind(chunk_index)
    .fetch_optional(pool)
    .await?;

    Ok(attempts)
}

/// Terminal state for a chunk that exhausted its retry budget
pub async fn mark_dead(pool: &SqlitePool, session_id: Uuid, chunk_index: i64) -> Result<()> {
    sqlx::query("UPDATE chunks SET status = 'DEAD' WHERE session_id = ? AND chunk_index = ?")
        .bind(session_id.to_string())
        .bind(chunk_index)
        .execute(pool)
        .await?;

    Ok(())
}

/// Media reference of one original chunk
pub async fn get_media_ref(
    pool: &SqlitePool,
    session_id: Uuid,
    chunk_index: i64,
) -> Result<Option<String>> {
    let media_ref: Option<String> =
        sqlx::query_scalar("SELECT media_ref FROM chunks WHERE session_id = ? AND chunk_index = ?")
            .bind(session_id.to_string())
            .bind(chunk_index)
            .fetch_optional(pool)
            .await?;

    Ok(media_ref)
}

/// PROCESSED original chunks with the smallest indices, up to `limit`
///
/// The compactor's batch selection: FIFO by chunk index, aggregates
/// excluded.
pub async fn select_processed_batch(
    pool: &SqlitePool,
    session_id: Uuid,
    limit: i64,
) -> Result<Vec<Chunk>> {
    let rows = sqlx::query(
        r#"
        SELECT *
        FROM chunks
        WHERE session_id = ?
          AND status = 'PROCESSED'
          AND chunk_index >= 0
        ORDER BY chunk_index
        LIMIT ?
        "#,
    )
    .bind(session_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(parse_chunk_row).collect()
}

/// All remaining chunks of a session ordered by start time
///
/// Used by the finalizer; the order is by interval start rather than index
/// because aggregates all share the reserved index.
pub async fn list_by_start_time(pool: &SqlitePool, session_id: Uuid) -> Result<Vec<Chunk>> {
    let rows = sqlx::query("SELECT * FROM chunks WHERE session_id = ? ORDER BY start_seconds")
        .bind(session_id.to_string())
        .fetch_all(pool)
        .await?;

    rows.iter().map(parse_chunk_row).collect()
}

/// Count of chunk rows for a session (test and admin helper)
pub async fn count_for_session(pool: &SqlitePool, session_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE session_id = ?")
        .bind(session_id.to_string())
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Insert a PROCESSED aggregate chunk within a compaction transaction
pub async fn insert_aggregate(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: Uuid,
    start_seconds: i64,
    end_seconds: i64,
    media_ref: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO chunks (session_id, chunk_index, start_seconds, end_seconds, media_ref, status)
        VALUES (?, ?, ?, ?, ?, 'PROCESSED')
        "#,
    )
    .bind(session_id.to_string())
    .bind(AGGREGATE_CHUNK_INDEX)
    .bind(start_seconds)
    .bind(end_seconds)
    .bind(media_ref)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Delete consumed chunk rows by id within a compaction transaction
pub async fn delete_by_ids(tx: &mut Transaction<'_, Sqlite>, ids: &[i64]) -> Result<()> {
    for id in ids {
        sqlx::query("DELETE FROM chunks WHERE id = ?")
            .bind(id)
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

/// Delete every chunk row of a session within the finalize transaction
pub async fn delete_all_for_session(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: Uuid,
) -> Result<()> {
    sqlx::query("DELETE FROM chunks WHERE session_id = ?")
        .bind(session_id.to_string())
        .execute(&mut **tx)
        .await?;

    Ok(())
}
