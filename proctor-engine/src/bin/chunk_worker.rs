//! chunk-worker - chunk analysis worker
//!
//! Any number of instances may run against the same root folder; the
//! per-session lock keeps at most one chunk per session in analysis.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use proctor_engine::analysis::detector_cli::DetectorCliAnalyzer;
use proctor_engine::lock::LockManager;
use proctor_engine::queue::JobQueue;
use proctor_engine::store::FsBlobStore;
use proctor_engine::workers::ChunkProcessor;

#[derive(Parser)]
#[command(name = "chunk-worker", about = "Proctoring chunk analysis worker")]
struct Args {
    /// Root folder holding the database, blobs, and scratch space
    #[arg(long)]
    root_folder: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    info!("Starting chunk-worker");

    let root = proctor_common::config::resolve_root_folder(args.root_folder.as_deref());
    proctor_common::config::ensure_root_layout(&root)?;
    info!("Root folder: {}", root.display());

    let config = proctor_engine::config::EngineConfig::load(&root)?;
    let db = proctor_engine::db::init_database_pool(&proctor_common::config::database_path(&root))
        .await?;

    let store = Arc::new(FsBlobStore::new(root.join("blobs")));
    let analyzer = Arc::new(DetectorCliAnalyzer::new(&config.detector_command));

    let processor = ChunkProcessor::new(
        db.clone(),
        JobQueue::new(db.clone()),
        LockManager::new(db),
        store,
        analyzer,
        config,
        root.join("scratch"),
    );

    processor.run().await;

    Ok(())
}
