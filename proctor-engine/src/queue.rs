//! Durable work queue over the shared `jobs` table
//!
//! FIFO by rowid, at-least-once, shared by all worker processes. Each
//! dequeue removes the eligible head row in one atomic statement, so two
//! consumers never receive the same row. There is no redelivery timer:
//! retries are explicit re-enqueues by the consumer, delayed with bounded
//! exponential backoff so a persistently busy session never causes a hot
//! re-enqueue loop.

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::{Row, SqlitePool};
use std::time::{Duration, Instant};
use uuid::Uuid;
use proctor_common::Result;

/// Dequeue poll period while waiting for work
const POLL_PERIOD: Duration = Duration::from_millis(250);

/// Ceiling for the exponential retry backoff
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// One chunk-processing job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub session_id: Uuid,
    pub chunk_index: i64,
    /// Times this job has been handed back to the queue (lock contention
    /// or analysis failure)
    pub attempts: i64,
}

impl Job {
    pub fn new(session_id: Uuid, chunk_index: i64) -> Self {
        Self {
            session_id,
            chunk_index,
            attempts: 0,
        }
    }
}

/// Delay before a job's next delivery: `base * 2^attempts`, capped
pub fn retry_backoff(base: Duration, attempts: i64) -> Duration {
    let shift = attempts.clamp(0, 16) as u32;
    base.checked_mul(1u32 << shift).unwrap_or(MAX_BACKOFF).min(MAX_BACKOFF)
}

/// Durable FIFO of chunk-processing jobs
#[derive(Clone)]
pub struct JobQueue {
    pool: SqlitePool,
}

impl JobQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a job to the tail of the queue
    pub async fn enqueue(&self, job: &Job) -> Result<()> {
        self.insert(job, None).await
    }

    /// Append a job that becomes deliverable only after `delay`
    pub async fn enqueue_delayed(&self, job: &Job, delay: Duration) -> Result<()> {
        let not_before =
            Utc::now() + ChronoDuration::from_std(delay).unwrap_or(ChronoDuration::zero());
        self.insert(job, Some(not_before.to_rfc3339())).await
    }

    async fn insert(&self, job: &Job, not_before: Option<String>) -> Result<()> {
        sqlx::query(
            "INSERT INTO jobs (session_id, chunk_index, attempts, not_before) VALUES (?, ?, ?, ?)",
        )
        .bind(job.session_id.to_string())
        .bind(job.chunk_index)
        .bind(job.attempts)
        .bind(not_before)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Take the head job, waiting up to `timeout` for one to appear
    ///
    /// Returns `None` when the deadline passes with no deliverable job.
    pub async fn dequeue(&self, timeout: Duration) -> Result<Option<Job>> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(job) = self.try_dequeue().await? {
                return Ok(Some(job));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_PERIOD.min(deadline - Instant::now())).await;
        }
    }

    /// Single non-blocking pop of the eligible head row
    pub async fn try_dequeue(&self) -> Result<Option<Job>> {
        let now = Utc::now().to_rfc3339();

        let row = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE id = (
                SELECT id FROM jobs
                WHERE not_before IS NULL OR not_before <= ?
                ORDER BY id
                LIMIT 1
            )
            RETURNING session_id, chunk_index, attempts
            "#,
        )
        .bind(&now)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let session_id: String = row.get("session_id");
                let session_id = Uuid::parse_str(&session_id).map_err(|e| {
                    proctor_common::Error::Decode(format!("Failed to parse session id: {}", e))
                })?;

                Ok(Some(Job {
                    session_id,
                    chunk_index: row.get("chunk_index"),
                    attempts: row.get("attempts"),
                }))
            }
            None => Ok(None),
        }
    }

    /// Queued job count (test and admin helper)
    pub async fn len(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
