//! Blob storage for chunk media, reference photos, and final recordings
//!
//! The pipeline only needs `put`/`get`/`delete` over opaque references;
//! content addressing and versioning are the store's concern. The
//! filesystem implementation keeps blobs under `<root>/blobs` using the
//! same key layout as the upload paths:
//! `{session}/chunks/{index}.webm`, `{session}/batches/{id}.webm`,
//! `{session}/reference/reference.jpg`, `{session}/final/final.webm`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use proctor_common::Result;

/// Durable blob storage consumed by the pipeline
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under `key`, returning the reference to fetch them back
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String>;

    /// Fetch previously stored bytes
    async fn get(&self, reference: &str) -> Result<Vec<u8>>;

    /// Remove a blob; absent blobs are tolerated
    async fn delete(&self, reference: &str) -> Result<()>;
}

/// Blob store rooted at a local directory
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, reference: &str) -> Result<PathBuf> {
        // Keys are relative paths; refuse anything escaping the root
        let path = Path::new(reference);
        if path.is_absolute() || path.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            return Err(proctor_common::Error::Blob(reference.to_string()));
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(key.to_string())
    }

    async fn get(&self, reference: &str) -> Result<Vec<u8>> {
        let path = self.resolve(reference)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(proctor_common::Error::BlobMissing(reference.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, reference: &str) -> Result<()> {
        let path = self.resolve(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Blob key for an original uploaded chunk
pub fn chunk_key(session_id: uuid::Uuid, chunk_index: i64) -> String {
    format!("{}/chunks/{}.webm", session_id, chunk_index)
}

/// Blob key for a compacted batch segment
pub fn batch_key(session_id: uuid::Uuid, first_row_id: i64) -> String {
    format!("{}/batches/{}.webm", session_id, first_row_id)
}

/// Blob key for a session's reference identity photo
pub fn reference_key(session_id: uuid::Uuid) -> String {
    format!("{}/reference/reference.jpg", session_id)
}

/// Blob key for the final assembled recording
pub fn final_key(session_id: uuid::Uuid) -> String {
    format!("{}/final/final.webm", session_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        let reference = store.put("s/chunks/0.webm", b"segment").await.unwrap();
        assert_eq!(store.get(&reference).await.unwrap(), b"segment");
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        let err = store.get("s/chunks/9.webm").await.unwrap_err();
        assert!(matches!(err, proctor_common::Error::BlobMissing(_)));
    }

    #[tokio::test]
    async fn delete_tolerates_absent_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        store.delete("s/chunks/9.webm").await.unwrap();
    }

    #[tokio::test]
    async fn rejects_escaping_references() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        assert!(store.get("../outside").await.is_err());
        assert!(store.put("/etc/shadow", b"x").await.is_err());
    }
}
