//! Violation event persistence (append-only)

use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use proctor_common::Result;

use crate::models::ViolationEvent;

/// Persist one debounced violation event
///
/// Events are never updated after insertion. All events of a chunk commit
/// in one transaction together with the PROCESSED transition, so a retry
/// can never see (or duplicate) half a chunk's events.
pub async fn insert_event(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    event: &ViolationEvent,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO events (
            session_id, event_type, message,
            start_seconds, end_seconds, duration_seconds,
            confidence, source_chunk_index, seek_seconds
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.session_id.to_string())
    .bind(event.kind.as_str())
    .bind(&event.message)
    .bind(event.start_seconds)
    .bind(event.end_seconds)
    .bind(event.duration_seconds)
    .bind(event.confidence)
    .bind(event.source_chunk_index)
    .bind(event.seek_seconds)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Stored event projection for the admin API
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoredEvent {
    pub event_type: String,
    pub message: String,
    pub start_seconds: i64,
    pub end_seconds: i64,
    pub duration_seconds: i64,
    pub confidence: f64,
    pub source_chunk_index: i64,
    pub seek_seconds: i64,
}

/// Events of a session in chronological order
pub async fn list_events(pool: &SqlitePool, session_id: Uuid) -> Result<Vec<StoredEvent>> {
    let rows = sqlx::query(
        r#"
        SELECT event_type, message,
               start_seconds, end_seconds, duration_seconds,
               confidence, source_chunk_index, seek_seconds
        FROM events
        WHERE session_id = ?
        ORDER BY start_seconds
        "#,
    )
    .bind(session_id.to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| StoredEvent {
            event_type: row.get("event_type"),
            message: row.get("message"),
            start_seconds: row.get("start_seconds"),
            end_seconds: row.get("end_seconds"),
            duration_seconds: row.get("duration_seconds"),
            confidence: row.get("confidence"),
            source_chunk_index: row.get("source_chunk_index"),
            seek_seconds: row.get("seek_seconds"),
        })
        .collect())
}
