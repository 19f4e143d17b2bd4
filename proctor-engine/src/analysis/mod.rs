//! Frame analysis boundary and violation aggregation
//!
//! The computer-vision side of the system lives behind the
//! [`FrameAnalyzer`] capability: given a chunk's media it yields, per
//! sampled timestamp, a fixed set of named observations. The aggregator
//! turns that dense stream into sparse, debounced violation events.

pub mod aggregator;
pub mod detector_cli;
pub mod messages;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Frame analysis errors
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Detector command could not be executed
    #[error("Failed to execute detector {0}: {1}")]
    Spawn(String, std::io::Error),

    /// Detector exited with a failure status
    #[error("Detector failed ({status}): {stderr}")]
    DetectorFailed { status: String, stderr: String },

    /// Detector output could not be parsed
    #[error("Failed to parse detector output: {0}")]
    Parse(String),

    /// I/O error around the analysis
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Identity verification outcome for one frame
///
/// Tri-state by contract: an inconclusive verification is no signal at
/// all and must never be coerced into a mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityCheck {
    Match,
    Mismatch,
    Inconclusive,
}

/// Observations for one sampled frame
///
/// Timestamps are chunk-relative seconds; the chunk processor shifts the
/// aggregated intervals to session-absolute time afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameObservations {
    pub timestamp_seconds: f64,
    pub face_count: u32,
    pub looking_away: bool,
    /// Confidence per detected phone, empty when none
    #[serde(default)]
    pub phone_confidences: Vec<f64>,
    /// Confidence per detected disallowed object, empty when none
    #[serde(default)]
    pub object_confidences: Vec<f64>,
    /// Absent when the session has no reference image
    #[serde(default)]
    pub identity: Option<IdentityCheck>,
}

/// Sampled-frame analysis of one chunk's media
///
/// Implementations must be deterministic per input frame and may be
/// arbitrarily expensive; the chunk processor treats them as a black box.
#[async_trait]
pub trait FrameAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        media: &Path,
        reference_image: Option<&Path>,
    ) -> Result<Vec<FrameObservations>, AnalysisError>;
}
