//! Chunk processor worker loop
//!
//! Dequeues `(session, chunk_index)` jobs, serializes per session through
//! the session lock, analyzes the chunk's media, and persists the
//! debounced violation events. The lock is held for the whole analysis
//! and extended by a heartbeat so a slow chunk does not silently lose
//! exclusivity; it is released on every exit path.

use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use proctor_common::Result;

use crate::analysis::{aggregator::ViolationAggregator, FrameAnalyzer};
use crate::config::EngineConfig;
use crate::db::{chunks, events, sessions};
use crate::lock::{session_lock_key, LockManager, LockToken};
use crate::queue::{retry_backoff, Job, JobQueue};
use crate::store::BlobStore;

/// Dequeue wait per loop iteration
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// Chunk analysis worker
pub struct ChunkProcessor {
    db: SqlitePool,
    queue: JobQueue,
    locks: LockManager,
    store: Arc<dyn BlobStore>,
    analyzer: Arc<dyn FrameAnalyzer>,
    config: EngineConfig,
    scratch_dir: PathBuf,
}

impl ChunkProcessor {
    pub fn new(
        db: SqlitePool,
        queue: JobQueue,
        locks: LockManager,
        store: Arc<dyn BlobStore>,
        analyzer: Arc<dyn FrameAnalyzer>,
        config: EngineConfig,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            db,
            queue,
            locks,
            store,
            analyzer,
            config,
            scratch_dir,
        }
    }

    /// Worker loop; runs until the process is stopped
    pub async fn run(&self) {
        info!("Chunk processor started");

        loop {
            match self.queue.dequeue(DEQUEUE_TIMEOUT).await {
                Ok(Some(job)) => {
                    if let Err(e) = self.handle_job(job).await {
                        error!("Job handling error: {}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Queue error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Handle one dequeued job end to end
    ///
    /// Lock refusal re-enqueues the job with exponential backoff. Analysis
    /// failure marks the chunk FAILED and retries with backoff until the
    /// attempt limit, after which the chunk is marked DEAD. The session
    /// lock is released in all cases.
    pub async fn handle_job(&self, job: Job) -> Result<()> {
        let ttl = self.config.session_lock_ttl();
        let key = session_lock_key(job.session_id);

        let Some(lock) = self.locks.acquire(&key, ttl).await? else {
            // Another chunk of the same session is processing
            let delay = retry_backoff(self.config.retry_backoff_base(), job.attempts);
            debug!(
                "Session {} busy; retrying chunk {} in {:?}",
                job.session_id, job.chunk_index, delay
            );
            let retry = Job {
                attempts: job.attempts + 1,
                ..job
            };
            self.queue.enqueue_delayed(&retry, delay).await?;
            return Ok(());
        };

        let heartbeat = self.spawn_heartbeat(lock.clone(), ttl);
        let outcome = self.process_chunk(&job).await;
        heartbeat.abort();

        if let Err(e) = &outcome {
            error!(
                "Chunk failed: session {} chunk {}: {}",
                job.session_id, job.chunk_index, e
            );
            self.record_failure(&job).await;
        }

        self.locks.release(&lock).await?;
        Ok(())
    }

    /// Periodically extend the session lock while analysis runs
    fn spawn_heartbeat(&self, lock: LockToken, ttl: Duration) -> JoinHandle<()> {
        let locks = self.locks.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ttl / 3);
            interval.tick().await; // first tick completes immediately

            loop {
                interval.tick().await;
                match locks.extend(&lock, ttl).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!("Session lock {} lost to TTL expiry", lock.key);
                        return;
                    }
                    Err(e) => warn!("Session lock extend failed: {}", e),
                }
            }
        })
    }

    /// Steps 2-5 of the job: state transition, media fetch, analysis,
    /// event persistence
    async fn process_chunk(&self, job: &Job) -> Result<()> {
        if !chunks::mark_processing(&self.db, job.session_id, job.chunk_index).await? {
            // Chunk row absent or already terminal; drop the job silently
            debug!(
                "No processable chunk for session {} index {}; dropping job",
                job.session_id, job.chunk_index
            );
            return Ok(());
        }

        let Some(media_ref) = chunks::get_media_ref(&self.db, job.session_id, job.chunk_index).await?
        else {
            debug!(
                "Chunk media missing for session {} index {}; dropping job",
                job.session_id, job.chunk_index
            );
            return Ok(());
        };

        let media_path = self.materialize(&media_ref, "webm").await?;
        let reference_path = match sessions::get_reference_image(&self.db, job.session_id).await? {
            Some(reference) => match self.materialize(&reference, "jpg").await {
                Ok(path) => Some(path),
                Err(e) => {
                    cleanup(&media_path).await;
                    return Err(e);
                }
            },
            None => None,
        };

        let analysis = self
            .analyzer
            .analyze(&media_path, reference_path.as_deref())
            .await;

        cleanup(&media_path).await;
        if let Some(reference_path) = &reference_path {
            cleanup(reference_path).await;
        }

        let frames = analysis
            .map_err(|e| proctor_common::Error::Media(format!("Analysis failed: {}", e)))?;

        let mut aggregator = ViolationAggregator::new(self.config.debounce_threshold_seconds);
        for frame in &frames {
            aggregator.observe_frame(frame);
        }

        // Events, the PROCESSED transition, and the session's processed
        // count commit together; a crash or error here leaves the chunk
        // PROCESSING with zero events, so the retry starts clean
        let chunk_start = (job.chunk_index * self.config.chunk_duration_seconds) as f64;
        let mut tx = self.db.begin().await?;
        let mut persisted = 0usize;
        for interval in aggregator.finish() {
            let event = interval.into_event(job.session_id, job.chunk_index, chunk_start);
            events::insert_event(&mut tx, &event).await?;
            persisted += 1;
        }
        chunks::mark_processed(&mut tx, job.session_id, job.chunk_index).await?;
        sessions::increment_processed_count(&mut tx, job.session_id).await?;
        tx.commit().await?;

        info!(
            "Session {} | Chunk {} | Events {}",
            job.session_id, job.chunk_index, persisted
        );

        Ok(())
    }

    /// Mark the chunk FAILED and schedule a bounded retry
    async fn record_failure(&self, job: &Job) {
        let attempts = match chunks::mark_failed(&self.db, job.session_id, job.chunk_index).await {
            Ok(Some(attempts)) => attempts,
            Ok(None) => {
                // Chunk not in PROCESSING; nothing to retry
                debug!(
                    "No failing chunk for session {} index {}; dropping job",
                    job.session_id, job.chunk_index
                );
                return;
            }
            Err(e) => {
                warn!("Could not record chunk failure: {}", e);
                return;
            }
        };

        if attempts < self.config.max_analysis_attempts {
            let delay = retry_backoff(self.config.retry_backoff_base(), attempts);
            let retry = Job {
                session_id: job.session_id,
                chunk_index: job.chunk_index,
                attempts,
            };
            if let Err(e) = self.queue.enqueue_delayed(&retry, delay).await {
                warn!("Could not re-enqueue failed chunk: {}", e);
            }
        } else {
            error!(
                "Chunk dead after {} attempts: session {} chunk {}",
                attempts, job.session_id, job.chunk_index
            );
            if let Err(e) = chunks::mark_dead(&self.db, job.session_id, job.chunk_index).await {
                warn!("Could not mark chunk dead: {}", e);
            }
        }
    }

    /// Copy a blob to a scratch file for the analyzer
    async fn materialize(&self, reference: &str, extension: &str) -> Result<PathBuf> {
        let bytes = self.store.get(reference).await?;
        let path = self
            .scratch_dir
            .join(format!("{}.{}", Uuid::new_v4(), extension));
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }
}

async fn cleanup(path: &std::path::Path) {
    let _ = tokio::fs::remove_file(path).await;
}
