//! Shared fixtures for pipeline integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use proctor_engine::analysis::{AnalysisError, FrameAnalyzer, FrameObservations};
use proctor_engine::config::EngineConfig;
use proctor_engine::db;
use proctor_engine::lock::LockManager;
use proctor_engine::media::{MediaMerger, MergeError};
use proctor_engine::queue::JobQueue;
use proctor_engine::store::{chunk_key, BlobStore, FsBlobStore};

/// Everything a worker needs, rooted in one temp directory
pub struct TestEnv {
    pub dir: tempfile::TempDir,
    pub db: SqlitePool,
    pub queue: JobQueue,
    pub locks: LockManager,
    pub store: Arc<FsBlobStore>,
    pub config: EngineConfig,
}

impl TestEnv {
    pub fn scratch(&self) -> PathBuf {
        self.dir.path().join("scratch")
    }
}

pub async fn test_env() -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("scratch")).unwrap();

    let db = db::init_database_pool(&dir.path().join("test.db"))
        .await
        .unwrap();
    let store = Arc::new(FsBlobStore::new(dir.path().join("blobs")));

    let config = EngineConfig {
        batch_size: 2,
        retry_backoff_base_ms: 10,
        ..EngineConfig::default()
    };

    TestEnv {
        queue: JobQueue::new(db.clone()),
        locks: LockManager::new(db.clone()),
        db,
        store,
        config,
        dir,
    }
}

/// Create a session already in PROCESSING with the given expected count
pub async fn processing_session(env: &TestEnv, expected_chunks: i64) -> Uuid {
    let session_id = Uuid::new_v4();
    db::sessions::create_session(&env.db, session_id, "exam-1", "candidate-1")
        .await
        .unwrap();
    assert!(db::sessions::end_session(&env.db, session_id, expected_chunks)
        .await
        .unwrap());
    session_id
}

/// Insert an uploaded chunk with stored media
pub async fn seed_chunk(env: &TestEnv, session_id: Uuid, index: i64, media: &[u8]) {
    let media_ref = env
        .store
        .put(&chunk_key(session_id, index), media)
        .await
        .unwrap();
    let duration = env.config.chunk_duration_seconds;
    assert!(db::chunks::create_chunk(
        &env.db,
        session_id,
        index,
        index * duration,
        (index + 1) * duration,
        &media_ref,
    )
    .await
    .unwrap());
}

/// Insert a chunk that already completed analysis
pub async fn seed_processed_chunk(env: &TestEnv, session_id: Uuid, index: i64, media: &[u8]) {
    seed_chunk(env, session_id, index, media).await;
    sqlx::query("UPDATE chunks SET status = 'PROCESSED' WHERE session_id = ? AND chunk_index = ?")
        .bind(session_id.to_string())
        .bind(index)
        .execute(&env.db)
        .await
        .unwrap();
    sqlx::query("UPDATE sessions SET processed_chunk_count = processed_chunk_count + 1 WHERE id = ?")
        .bind(session_id.to_string())
        .execute(&env.db)
        .await
        .unwrap();
}

pub async fn chunk_status(env: &TestEnv, session_id: Uuid, index: i64) -> Option<String> {
    sqlx::query_scalar("SELECT status FROM chunks WHERE session_id = ? AND chunk_index = ?")
        .bind(session_id.to_string())
        .bind(index)
        .fetch_optional(&env.db)
        .await
        .unwrap()
}

pub async fn session_status(env: &TestEnv, session_id: Uuid) -> String {
    sqlx::query_scalar("SELECT status FROM sessions WHERE id = ?")
        .bind(session_id.to_string())
        .fetch_one(&env.db)
        .await
        .unwrap()
}

/// Frame analyzer replaying a fixed observation script
pub struct ScriptedAnalyzer {
    pub frames: Vec<FrameObservations>,
    pub fail: bool,
}

impl ScriptedAnalyzer {
    pub fn ok(frames: Vec<FrameObservations>) -> Self {
        Self { frames, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            frames: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl FrameAnalyzer for ScriptedAnalyzer {
    async fn analyze(
        &self,
        _media: &Path,
        _reference_image: Option<&Path>,
    ) -> Result<Vec<FrameObservations>, AnalysisError> {
        if self.fail {
            return Err(AnalysisError::Parse("scripted failure".to_string()));
        }
        Ok(self.frames.clone())
    }
}

/// Merger that concatenates raw bytes; stands in for the ffmpeg stream
/// copy so merged content stays assertable
pub struct ByteConcatMerger;

#[async_trait]
impl MediaMerger for ByteConcatMerger {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), MergeError> {
        if inputs.is_empty() {
            return Err(MergeError::NoInputs);
        }
        let mut merged = Vec::new();
        for input in inputs {
            merged.extend(tokio::fs::read(input).await?);
        }
        tokio::fs::write(output, merged).await?;
        Ok(())
    }
}

/// A quiet frame: one face, forward gaze, nothing detected
pub fn quiet_frame(t: f64) -> FrameObservations {
    FrameObservations {
        timestamp_seconds: t,
        face_count: 1,
        looking_away: false,
        phone_confidences: Vec::new(),
        object_confidences: Vec::new(),
        identity: None,
    }
}
