//! Uploaded media segment entity

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved chunk index marking a compacted aggregate segment
pub const AGGREGATE_CHUNK_INDEX: i64 = -1;

/// Chunk lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkStatus {
    /// Uploaded and stored, analysis not yet started
    Received,
    /// A worker holds the session lock and is analyzing this chunk
    Processing,
    /// Analyzed exactly once; eligible for compaction
    Processed,
    /// Analysis failed; retried with backoff until the attempt limit
    Failed,
    /// Retry limit exhausted; left for operator remediation
    Dead,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Received => "RECEIVED",
            ChunkStatus::Processing => "PROCESSING",
            ChunkStatus::Processed => "PROCESSED",
            ChunkStatus::Failed => "FAILED",
            ChunkStatus::Dead => "DEAD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RECEIVED" => Some(ChunkStatus::Received),
            "PROCESSING" => Some(ChunkStatus::Processing),
            "PROCESSED" => Some(ChunkStatus::Processed),
            "FAILED" => Some(ChunkStatus::Failed),
            "DEAD" => Some(ChunkStatus::Dead),
            _ => None,
        }
    }
}

/// One uploaded time segment, or a compacted aggregate of several
///
/// `(session_id, chunk_index)` is unique for original chunks (index >= 0);
/// aggregates all carry [`AGGREGATE_CHUNK_INDEX`] and are distinguished by
/// their row id and `[start_seconds, end_seconds)` interval.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: i64,
    pub session_id: Uuid,
    pub chunk_index: i64,
    pub start_seconds: i64,
    pub end_seconds: i64,
    pub media_ref: String,
    pub status: ChunkStatus,
    pub attempts: i64,
}

impl Chunk {
    /// Whether this row is a compacted aggregate segment
    pub fn is_aggregate(&self) -> bool {
        self.chunk_index == AGGREGATE_CHUNK_INDEX
    }
}
