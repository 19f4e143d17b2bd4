//! Session finalization: gating, assembly order, cleanup

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use proctor_engine::db;
use proctor_engine::lock::session_lock_key;
use proctor_engine::store::BlobStore;
use proctor_engine::workers::SessionFinalizer;

use helpers::{
    processing_session, seed_processed_chunk, session_status, test_env, ByteConcatMerger,
    TestEnv,
};

fn finalizer(env: &TestEnv) -> SessionFinalizer {
    SessionFinalizer::new(
        env.db.clone(),
        env.locks.clone(),
        env.store.clone(),
        Arc::new(ByteConcatMerger),
        env.config.clone(),
        env.scratch(),
    )
}

#[tokio::test]
async fn final_recording_covers_all_segments_in_time_order() {
    let env = test_env().await;
    let session_id = processing_session(&env, 3).await;

    // Insert out of row order; assembly must follow start times
    seed_processed_chunk(&env, session_id, 2, b"C").await;
    seed_processed_chunk(&env, session_id, 0, b"A").await;
    seed_processed_chunk(&env, session_id, 1, b"B").await;

    finalizer(&env).tick().await.unwrap();

    assert_eq!(session_status(&env, session_id).await, "DONE");

    let session = db::sessions::get_session(&env.db, session_id)
        .await
        .unwrap()
        .unwrap();
    let final_ref = session.final_media.expect("final media reference");
    assert_eq!(env.store.get(&final_ref).await.unwrap(), b"ABC");

    // Segment rows and blobs are consumed by the assembly
    let count = db::chunks::count_for_session(&env.db, session_id)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn finalization_waits_for_lagging_chunks() {
    let env = test_env().await;
    let session_id = processing_session(&env, 3).await;
    seed_processed_chunk(&env, session_id, 0, b"A").await;
    seed_processed_chunk(&env, session_id, 1, b"B").await;
    // Chunk 2 has not finished analysis

    finalizer(&env).tick().await.unwrap();

    assert_eq!(session_status(&env, session_id).await, "PROCESSING");
    let count = db::chunks::count_for_session(&env.db, session_id)
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn session_with_no_segments_is_left_alone() {
    let env = test_env().await;
    let session_id = processing_session(&env, 0).await;

    assert!(!finalizer(&env).finalize_one(session_id).await.unwrap());
    assert_eq!(session_status(&env, session_id).await, "PROCESSING");
}

#[tokio::test]
async fn finalizer_defers_to_the_session_lock() {
    let env = test_env().await;
    let session_id = processing_session(&env, 1).await;
    seed_processed_chunk(&env, session_id, 0, b"A").await;

    let held = env
        .locks
        .acquire(&session_lock_key(session_id), Duration::from_secs(60))
        .await
        .unwrap()
        .unwrap();

    finalizer(&env).tick().await.unwrap();
    assert_eq!(session_status(&env, session_id).await, "PROCESSING");

    env.locks.release(&held).await.unwrap();
    finalizer(&env).tick().await.unwrap();
    assert_eq!(session_status(&env, session_id).await, "DONE");
}

#[tokio::test]
async fn ending_a_session_twice_is_rejected() {
    let env = test_env().await;
    let session_id = processing_session(&env, 2).await;

    // Second end is a conflict; counts and status are unchanged
    assert!(!db::sessions::end_session(&env.db, session_id, 5)
        .await
        .unwrap());
    let session = db::sessions::get_session(&env.db, session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.expected_chunk_count, Some(2));
}
