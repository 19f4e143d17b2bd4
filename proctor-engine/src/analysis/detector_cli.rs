//! Detector sidecar frame analyzer
//!
//! Runs the configured detector command (the CV sidecar bundling face
//! counting, gaze estimation, object detection, and identity verification)
//! once per chunk and parses its JSON frame list:
//!
//! ```text
//! proctor-detect <media> <output.json> [--reference <photo>]
//! ```
//!
//! The output file holds a JSON array of frame observation objects, one
//! per sampled timestamp.

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use super::{AnalysisError, FrameAnalyzer, FrameObservations};

/// Frame analyzer backed by an external detector CLI
pub struct DetectorCliAnalyzer {
    command: String,
}

impl DetectorCliAnalyzer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl FrameAnalyzer for DetectorCliAnalyzer {
    async fn analyze(
        &self,
        media: &Path,
        reference_image: Option<&Path>,
    ) -> Result<Vec<FrameObservations>, AnalysisError> {
        let output_path = media.with_extension("observations.json");

        let mut command = Command::new(&self.command);
        command.arg(media).arg(&output_path);
        if let Some(reference) = reference_image {
            command.arg("--reference").arg(reference);
        }

        debug!("Running detector: {} {}", self.command, media.display());

        let output = command
            .output()
            .await
            .map_err(|e| AnalysisError::Spawn(self.command.clone(), e))?;

        if !output.status.success() {
            let _ = tokio::fs::remove_file(&output_path).await;
            return Err(AnalysisError::DetectorFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let raw = tokio::fs::read(&output_path).await?;
        let _ = tokio::fs::remove_file(&output_path).await;

        let mut frames: Vec<FrameObservations> =
            serde_json::from_slice(&raw).map_err(|e| AnalysisError::Parse(e.to_string()))?;

        // The aggregator requires frames in increasing time order
        frames.sort_by(|a, b| {
            a.timestamp_seconds
                .partial_cmp(&b.timestamp_seconds)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(frames)
    }
}
