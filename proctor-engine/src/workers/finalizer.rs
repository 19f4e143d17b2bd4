//! Session finalizer worker
//!
//! Once a session's every expected chunk has been analyzed, merges all
//! remaining segments (aggregates and leftover originals, ordered by start
//! time) into the final recording, retires the session, and deletes the
//! consumed chunk rows in one transaction.
//!
//! Eligibility requires `processed_chunk_count >= expected_chunk_count`,
//! so a session with in-flight, failed, or dead chunks is never finalized
//! behind the processor's back.

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
use crate::store::{final_key, BlobStore};

/// Periodic session finalization worker
pub struct SessionFinalizer {
    db: SqlitePool,
    locks: LockManager,
    store: Arc<dyn BlobStore>,
    merger: Arc<dyn MediaMerger>,
    config: EngineConfig,
    scratch_dir: PathBuf,
}

impl SessionFinalizer {
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
        let mut interval = time::interval(Duration::from_secs(self.config.finalizer_poll_seconds));
        info!(
            "Session finalizer started ({}s interval)",
            self.config.finalizer_poll_seconds
        );

        loop {
            interval.tick().await;
            if let Err(e) = self.tick().await {
                error!("Finalizer error: {}", e);
            }
        }
    }

    /// One finalization cycle over every fully processed session
    pub async fn tick(&self) -> Result<()> {
        for session_id in sessions::list_finalizable(&self.db).await? {
            if let Err(e) = self.finalize_session(session_id).await {
                error!("Finalization failed for session {}: {}", session_id, e);
            }
        }
        Ok(())
    }

    /// Finalize one session, under the session lock
    async fn finalize_session(&self, session_id: Uuid) -> Result<()> {
        let key = session_lock_key(session_id);
        let Some(lock) = self
            .locks
            .acquire(&key, self.config.session_lock_ttl())
            .await?
        else {
            // Worker or compactor active on this session; next cycle
            debug!("Session {} busy; skipping finalization", session_id);
            return Ok(());
        };

        let outcome = self.finalize_one(session_id).await;
        self.locks.release(&lock).await?;
        outcome.map(|_| ())
    }

    /// Assemble the final recording and retire the session
    ///
    /// Returns false when the session has no chunk rows left to merge.
    pub async fn finalize_one(&self, session_id: Uuid) -> Result<bool> {
        // All remaining chunks: aggregates plus any leftover originals
        let remaining = chunks::list_by_start_time(&self.db, session_id).await?;
        if remaining.is_empty() {
            return Ok(false);
        }

        let mut local_files = Vec::with_capacity(remaining.len());
        for chunk in &remaining {
            let bytes = self.store.get(&chunk.media_ref).await?;
            let path = self
                .scratch_dir
                .join(format!("{}.webm", Uuid::new_v4()));
            tokio::fs::write(&path, &bytes).await?;
            local_files.push(path);
        }

        let final_path = self.scratch_dir.join(format!("{}.webm", Uuid::new_v4()));
        let merge_result = self.merger.merge(&local_files, &final_path).await;

        for path in &local_files {
            let _ = tokio::fs::remove_file(path).await;
        }
        merge_result
            .map_err(|e| proctor_common::Error::Media(format!("Final merge failed: {}", e)))?;

        let final_bytes = tokio::fs::read(&final_path).await?;
        let _ = tokio::fs::remove_file(&final_path).await;

        let final_ref = self
            .store
            .put(&final_key(session_id), &final_bytes)
            .await?;

        let mut tx = self.db.begin().await?;
        sessions::mark_done(&mut tx, session_id, &final_ref).await?;
        chunks::delete_all_for_session(&mut tx, session_id).await?;
        tx.commit().await?;

        for chunk in &remaining {
            let _ = self.store.delete(&chunk.media_ref).await;
        }

        info!(
            "Session {} | Finalized {} segments into {}",
            session_id,
            remaining.len(),
            final_ref
        );

        Ok(true)
    }
}
