//! Exam session entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session lifecycle state
///
/// Transitions are monotonic: ACTIVE → PROCESSING → DONE, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Intake in progress, chunks still arriving
    Active,
    /// Intake ended, chunks being analyzed and compacted
    Processing,
    /// Final recording assembled, session retired
    Done,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Processing => "PROCESSING",
            SessionStatus::Done => "DONE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(SessionStatus::Active),
            "PROCESSING" => Some(SessionStatus::Processing),
            "DONE" => Some(SessionStatus::Done),
            _ => None,
        }
    }
}

/// One exam attempt
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub exam_id: String,
    pub candidate_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Set exactly once, atomically with the ACTIVE → PROCESSING transition
    pub expected_chunk_count: Option<i64>,
    /// Incremented each time a chunk reaches PROCESSED; survives compaction
    /// deleting the chunk rows, so the finalizer can gate on it
    pub processed_chunk_count: i64,
    pub reference_image: Option<String>,
    pub final_media: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for status in [
            SessionStatus::Active,
            SessionStatus::Processing,
            SessionStatus::Done,
        ] {
            assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SessionStatus::parse("EXPIRED"), None);
    }
}
