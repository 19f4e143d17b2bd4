//! Lossless media concatenation
//!
//! Compaction and finalization both fold segments together with a
//! container-level stream copy; nothing is re-encoded, so all inputs must
//! share the same codec and container. The production implementation
//! shells out to ffmpeg's concat demuxer.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Media merge errors
#[derive(Debug, Error)]
pub enum MergeError {
    /// No input segments were given
    #[error("No input segments to merge")]
    NoInputs,

    /// ffmpeg binary could not be executed
    #[error("Failed to execute {0}: {1}")]
    Spawn(String, std::io::Error),

    /// ffmpeg exited with a failure status
    #[error("Merge command failed ({status}): {stderr}")]
    CommandFailed { status: String, stderr: String },

    /// I/O error while preparing the merge
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability that folds media segments into one output file
#[async_trait]
pub trait MediaMerger: Send + Sync {
    /// Concatenate `inputs` in order into `output`
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), MergeError>;
}

/// Concat-demuxer merge via the ffmpeg CLI (`-c copy`, no re-encoding)
pub struct FfmpegMerger {
    ffmpeg_path: String,
}

impl FfmpegMerger {
    pub fn new() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }

    pub fn with_binary(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

impl Default for FfmpegMerger {
    fn default() -> Self {
        Self::new()
    }
}

/// Concat demuxer list file body for the given inputs
fn concat_list(inputs: &[PathBuf]) -> String {
    let mut list = String::new();
    for path in inputs {
        // The concat demuxer's quoting rule: single quotes closed around
        // any embedded single quote
        let escaped = path.display().to_string().replace('\'', "'\\''");
        list.push_str(&format!("file '{}'\n", escaped));
    }
    list
}

#[async_trait]
impl MediaMerger for FfmpegMerger {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<(), MergeError> {
        if inputs.is_empty() {
            return Err(MergeError::NoInputs);
        }

        let list_path = output.with_extension("list.txt");
        tokio::fs::write(&list_path, concat_list(inputs)).await?;

        debug!(
            "Merging {} segments into {}",
            inputs.len(),
            output.display()
        );

        let result = Command::new(&self.ffmpeg_path)
            .arg("-y")
            .arg("-f")
            .arg("concat")
            .arg("-safe")
            .arg("0")
            .arg("-i")
            .arg(&list_path)
            .arg("-c")
            .arg("copy")
            .arg(output)
            .output()
            .await;

        // Remove the list file before inspecting the outcome
        let _ = tokio::fs::remove_file(&list_path).await;

        let output_info =
            result.map_err(|e| MergeError::Spawn(self.ffmpeg_path.clone(), e))?;

        if !output_info.status.success() {
            return Err(MergeError::CommandFailed {
                status: output_info.status.to_string(),
                stderr: String::from_utf8_lossy(&output_info.stderr).into_owned(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_file_orders_inputs() {
        let inputs = vec![PathBuf::from("/tmp/a.webm"), PathBuf::from("/tmp/b.webm")];
        let list = concat_list(&inputs);
        assert_eq!(list, "file '/tmp/a.webm'\nfile '/tmp/b.webm'\n");
    }

    #[test]
    fn list_file_escapes_single_quotes() {
        let inputs = vec![PathBuf::from("/tmp/o'clock.webm")];
        let list = concat_list(&inputs);
        assert_eq!(list, "file '/tmp/o'\\''clock.webm'\n");
    }

    #[tokio::test]
    async fn empty_input_set_is_rejected() {
        let merger = FfmpegMerger::new();
        let err = merger.merge(&[], Path::new("/tmp/out.webm")).await.unwrap_err();
        assert!(matches!(err, MergeError::NoInputs));
    }
}
