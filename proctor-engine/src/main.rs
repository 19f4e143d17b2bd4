//! proctord - proctoring intake and admin HTTP server
//!
//! Receives session lifecycle calls and chunk uploads, enqueues analysis
//! jobs, and serves the read-only admin projections. The actual chunk
//! processing runs in the separate worker binaries sharing this root
//! folder.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use proctor_engine::store::FsBlobStore;
use proctor_engine::AppState;

#[derive(Parser)]
#[command(name = "proctord", about = "Proctoring intake and admin server")]
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

    info!("Starting proctord (intake server)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let root = proctor_common::config::resolve_root_folder(args.root_folder.as_deref());
    proctor_common::config::ensure_root_layout(&root)?;
    info!("Root folder: {}", root.display());

    let config = proctor_engine::config::EngineConfig::load(&root)?;

    let db_path = proctor_common::config::database_path(&root);
    info!("Database: {}", db_path.display());
    let db = proctor_engine::db::init_database_pool(&db_path).await?;

    let store = Arc::new(FsBlobStore::new(root.join("blobs")));
    let state = AppState::new(db, store, config.clone());
    let app = proctor_engine::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on http://{}", config.bind_addr);
    info!("Health check: http://{}/health", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
