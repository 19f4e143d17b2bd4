//! Batch compaction over processed chunks

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use proctor_engine::db;
use proctor_engine::lock::session_lock_key;
use proctor_engine::models::AGGREGATE_CHUNK_INDEX;
use proctor_engine::store::BlobStore;
use proctor_engine::workers::BatchCompactor;

use helpers::{
    processing_session, seed_processed_chunk, test_env, ByteConcatMerger, TestEnv,
};

fn compactor(env: &TestEnv) -> BatchCompactor {
    BatchCompactor::new(
        env.db.clone(),
        env.locks.clone(),
        env.store.clone(),
        Arc::new(ByteConcatMerger),
        env.config.clone(),
        env.scratch(),
    )
}

#[tokio::test]
async fn compaction_folds_lowest_indices_first() {
    let env = test_env().await;
    let session_id = processing_session(&env, 5).await;
    for i in 0..5 {
        seed_processed_chunk(&env, session_id, i, format!("{}", i).as_bytes()).await;
    }

    let worker = compactor(&env);

    // First pass folds chunks 0 and 1
    assert!(worker.compact_one(session_id).await.unwrap());
    let chunks = db::chunks::list_by_start_time(&env.db, session_id)
        .await
        .unwrap();
    let aggregate = chunks
        .iter()
        .find(|c| c.chunk_index == AGGREGATE_CHUNK_INDEX)
        .expect("aggregate row");
    assert_eq!(aggregate.start_seconds, 0);
    assert_eq!(aggregate.end_seconds, 40);
    let merged = env.store.get(&aggregate.media_ref).await.unwrap();
    assert_eq!(merged, b"01");

    let remaining: Vec<i64> = chunks
        .iter()
        .filter(|c| !c.is_aggregate())
        .map(|c| c.chunk_index)
        .collect();
    assert_eq!(remaining, vec![2, 3, 4]);

    // Second pass folds chunks 2 and 3; chunk 4 is a short batch and
    // must stay untouched
    assert!(worker.compact_one(session_id).await.unwrap());
    assert!(!worker.compact_one(session_id).await.unwrap());

    let chunks = db::chunks::list_by_start_time(&env.db, session_id)
        .await
        .unwrap();
    let aggregates: Vec<&proctor_engine::models::Chunk> =
        chunks.iter().filter(|c| c.is_aggregate()).collect();
    assert_eq!(aggregates.len(), 2);
    assert_eq!(aggregates[1].start_seconds, 40);
    assert_eq!(aggregates[1].end_seconds, 80);

    let leftovers: Vec<i64> = chunks
        .iter()
        .filter(|c| !c.is_aggregate())
        .map(|c| c.chunk_index)
        .collect();
    assert_eq!(leftovers, vec![4]);
}

#[tokio::test]
async fn short_batch_is_never_merged() {
    let env = test_env().await;
    let session_id = processing_session(&env, 1).await;
    seed_processed_chunk(&env, session_id, 0, b"only").await;

    let worker = compactor(&env);
    assert!(!worker.compact_one(session_id).await.unwrap());

    let count = db::chunks::count_for_session(&env.db, session_id)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn compaction_consumes_source_blobs() {
    let env = test_env().await;
    let session_id = processing_session(&env, 2).await;
    seed_processed_chunk(&env, session_id, 0, b"a").await;
    seed_processed_chunk(&env, session_id, 1, b"b").await;

    let before = db::chunks::list_by_start_time(&env.db, session_id)
        .await
        .unwrap();
    let source_refs: Vec<String> = before.iter().map(|c| c.media_ref.clone()).collect();

    compactor(&env).compact_one(session_id).await.unwrap();

    for media_ref in source_refs {
        assert!(env.store.get(&media_ref).await.is_err());
    }
}

#[tokio::test]
async fn busy_session_is_skipped_by_the_tick() {
    let env = test_env().await;
    let session_id = processing_session(&env, 2).await;
    seed_processed_chunk(&env, session_id, 0, b"a").await;
    seed_processed_chunk(&env, session_id, 1, b"b").await;

    let held = env
        .locks
        .acquire(&session_lock_key(session_id), Duration::from_secs(60))
        .await
        .unwrap()
        .unwrap();

    compactor(&env).tick().await.unwrap();

    // Nothing was folded while the chunk worker held the mutex
    let count = db::chunks::count_for_session(&env.db, session_id)
        .await
        .unwrap();
    assert_eq!(count, 2);

    env.locks.release(&held).await.unwrap();
}
