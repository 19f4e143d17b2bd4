//! finalizer - periodic session finalization worker

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use proctor_engine::lock::LockManager;
use proctor_engine::media::FfmpegMerger;
use proctor_engine::store::FsBlobStore;
use proctor_engine::workers::SessionFinalizer;

#[derive(Parser)]
#[command(name = "finalizer", about = "Proctoring session finalization worker")]
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

    info!("Starting finalizer");

    let root = proctor_common::config::resolve_root_folder(args.root_folder.as_deref());
    proctor_common::config::ensure_root_layout(&root)?;
    info!("Root folder: {}", root.display());

    let config = proctor_engine::config::EngineConfig::load(&root)?;
    let db = proctor_engine::db::init_database_pool(&proctor_common::config::database_path(&root))
        .await?;

    let finalizer = SessionFinalizer::new(
        db.clone(),
        LockManager::new(db),
        Arc::new(FsBlobStore::new(root.join("blobs"))),
        Arc::new(FfmpegMerger::new()),
        config,
        root.join("scratch"),
    );

    finalizer.run().await;

    Ok(())
}
