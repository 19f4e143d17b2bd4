//! Error type shared by the intake server and the worker binaries

use thiserror::Error;

/// Result alias used throughout the pipeline crates
pub type Result<T> = std::result::Result<T, Error>;

/// Failures the pipeline binaries have in common
///
/// Everything a worker loop can hit while moving a chunk through its
/// lifecycle: the shared database, blob storage, media tooling, and the
/// service configuration. HTTP-specific errors live in the engine crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row that cannot be mapped back to its entity (bad uuid,
    /// unknown status string, unparseable timestamp)
    #[error("Corrupt row: {0}")]
    Decode(String),

    /// Blob reference that escapes the store's key space
    #[error("Invalid blob reference: {0}")]
    Blob(String),

    /// Referenced blob does not exist in the store
    #[error("Blob not found: {0}")]
    BlobMissing(String),

    /// Detector or ffmpeg failure while analyzing or merging media
    #[error("Media error: {0}")]
    Media(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
