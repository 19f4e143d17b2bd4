//! Violation event entity

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed enumeration of monitored proctoring signals
///
/// Each kind is aggregated independently by the violation aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    /// Candidate not visible on camera
    NoFace,
    /// More than one person in frame
    MultiplePeople,
    /// Gaze deviated from the screen
    LookingAway,
    /// Mobile phone in frame
    PhoneUsage,
    /// Disallowed object (book, laptop, second keyboard, ...) in frame
    SuspectedObject,
    /// Candidate does not match the session's reference photo
    IdentityMismatch,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::NoFace => "NO_FACE",
            ViolationKind::MultiplePeople => "MULTIPLE_PEOPLE",
            ViolationKind::LookingAway => "LOOKING_AWAY",
            ViolationKind::PhoneUsage => "PHONE_USAGE",
            ViolationKind::SuspectedObject => "SUSPECTED_OBJECT",
            ViolationKind::IdentityMismatch => "IDENTITY_MISMATCH",
        }
    }
}

/// Immutable record of a detected anomaly
///
/// Born in the violation aggregator while a chunk is analyzed, persisted
/// once when the condition clears (or the chunk's frame stream ends), and
/// never updated afterwards. All offsets are session-absolute seconds.
#[derive(Debug, Clone, Serialize)]
pub struct ViolationEvent {
    pub session_id: Uuid,
    pub kind: ViolationKind,
    pub message: String,
    pub start_seconds: i64,
    pub end_seconds: i64,
    pub duration_seconds: i64,
    /// Maximum confidence observed while the condition held (0-1)
    pub confidence: f64,
    pub source_chunk_index: i64,
    /// Offset for UI playback of the final recording
    pub seek_seconds: i64,
}
