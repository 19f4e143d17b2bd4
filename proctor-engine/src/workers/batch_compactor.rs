//! Batch compactor worker
//!
//! Periodically folds a fixed-size batch of PROCESSED original chunks per
//! PROCESSING session into one aggregate segment, keeping the live chunk
//! row count bounded at roughly total / batch_size regardless of session
//! length. Partial batches are left for a later cycle; the final leftover
//! tail is handled by the finalizer.

use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info};
use uuid::Uuid;

use proctor_common::Result;

use crate::config::EngineConfig;
use crate::db::{chunks, sessions};
use crate::lock::{session_lock_key, LockManager};
use crate::media::MediaMerger;
use crate::store::{batch_key, BlobStore};

/// Periodic chunk compaction worker
pub struct BatchCompactor {
    db: SqlitePool,
    locks: LockManager,
    store: Arc<dyn BlobStore>,
    merger: Arc<dyn MediaMerger>,
    config: EngineConfig,
    scratch_dir: PathBuf,
}

impl BatchCompactor {
    pub fn new(
        db: SqlitePool,
        locks: LockManager,
        store: Arc<dyn BlobStore>,
        merger: Arc<dyn MediaMerger>,
        config: EngineConfig,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            db,
            locks,
            store,
            merger,
            config,
            scratch_dir,
        }
    }

    /// Poll loop; runs until the process is stopped
    pub async fn run(&self) {
        let mut interval = time::interval(Duration::from_secs(self.config.compactor_poll_seconds));
        info!(
            "Batch compactor started ({}s interval, batch size {})",
            self.config.compactor_poll_seconds, self.config.batch_size
        );

        loop {
            interval.tick().await;
            if let Err(e) = self.tick().await {
                error!("Batch compactor error: {}", e);
            }
        }
    }

    /// One compaction cycle over every PROCESSING session
    pub async fn tick(&self) -> Result<()> {
        for session_id in sessions::list_processing(&self.db).await? {
            if let Err(e) = self.compact_session(session_id).await {
                error!("Compaction failed for session {}: {}", session_id, e);
            }
        }
        Ok(())
    }

    /// Compact one batch for one session, under the session lock
    async fn compact_session(&self, session_id: Uuid) -> Result<()> {
        let key = session_lock_key(session_id);
        let Some(lock) = self
            .locks
            .acquire(&key, self.config.session_lock_ttl())
            .await?
        else {
            // A worker or the finalizer holds the session; next cycle
            debug!("Session {} busy; skipping compaction", session_id);
            return Ok(());
        };

        let outcome = self.compact_one(session_id).await;
        self.locks.release(&lock).await?;
        outcome.map(|_| ())
    }

    /// Merge one batch of PROCESSED chunks into an aggregate segment
    ///
    /// Returns false when fewer than `batch_size` chunks are available
    /// (no partial merges). The aggregate row insert and the consumed row
    /// deletes happen in a single transaction.
    pub async fn compact_one(&self, session_id: Uuid) -> Result<bool> {
        let batch =
            chunks::select_processed_batch(&self.db, session_id, self.config.batch_size).await?;
        if (batch.len() as i64) < self.config.batch_size {
            return Ok(false);
        }

        // Aggregate interval across the batch
        let batch_start = batch.iter().map(|c| c.start_seconds).min().unwrap_or(0);
        let batch_end = batch.iter().map(|c| c.end_seconds).max().unwrap_or(0);

        let mut local_files = Vec::with_capacity(batch.len());
        for chunk in &batch {
            let bytes = self.store.get(&chunk.media_ref).await?;
            let path = self
                .scratch_dir
                .join(format!("{}.webm", Uuid::new_v4()));
            tokio::fs::write(&path, &bytes).await?;
            local_files.push(path);
        }

        let merged_path = self.scratch_dir.join(format!("{}.webm", Uuid::new_v4()));
        let merge_result = self.merger.merge(&local_files, &merged_path).await;

        for path in &local_files {
            let _ = tokio::fs::remove_file(path).await;
        }
        merge_result
            .map_err(|e| proctor_common::Error::Media(format!("Batch merge failed: {}", e)))?;

        let merged_bytes = tokio::fs::read(&merged_path).await?;
        let _ = tokio::fs::remove_file(&merged_path).await;

        let media_ref = self
            .store
            .put(&batch_key(session_id, batch[0].id), &merged_bytes)
            .await?;

        let ids: Vec<i64> = batch.iter().map(|c| c.id).collect();
        let mut tx = self.db.begin().await?;
        chunks::insert_aggregate(&mut tx, session_id, batch_start, batch_end, &media_ref).await?;
        chunks::delete_by_ids(&mut tx, &ids).await?;
        tx.commit().await?;

        // Consumed segment blobs are unreachable once the rows are gone
        for chunk in &batch {
            let _ = self.store.delete(&chunk.media_ref).await;
        }

        info!(
            "Session {} | Compacted {} chunks into [{}, {})",
            session_id,
            batch.len(),
            batch_start,
            batch_end
        );

        Ok(true)
    }
}
