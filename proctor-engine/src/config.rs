//! Engine configuration
//!
//! Loaded from `proctor.toml` in the root folder when present, otherwise
//! compiled defaults. A few operationally relevant settings accept
//! environment variable overrides on top of the file.

use proctor_common::Result;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Tunable settings shared by the intake server and the workers
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fixed duration of every uploaded chunk, used to derive chunk
    /// intervals and session-absolute event times
    pub chunk_duration_seconds: i64,
    /// Number of PROCESSED chunks folded together per compaction cycle
    pub batch_size: i64,
    /// Minimum duration a condition must hold to be persisted as an event
    pub debounce_threshold_seconds: f64,
    /// Batch compactor poll interval
    pub compactor_poll_seconds: u64,
    /// Session finalizer poll interval
    pub finalizer_poll_seconds: u64,
    /// TTL of the per-session processing mutex
    pub session_lock_ttl_seconds: u64,
    /// TTL of the per-session upload guard
    pub upload_lock_ttl_seconds: u64,
    /// Analysis attempts per chunk before it is marked DEAD
    pub max_analysis_attempts: i64,
    /// Base delay for exponential retry backoff
    pub retry_backoff_base_ms: u64,
    /// Intake server bind address
    pub bind_addr: String,
    /// Detector sidecar command run per chunk by the frame analyzer
    pub detector_command: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_duration_seconds: 20,
            batch_size: 2,
            debounce_threshold_seconds: 2.0,
            compactor_poll_seconds: 5,
            finalizer_poll_seconds: 10,
            session_lock_ttl_seconds: 120,
            upload_lock_ttl_seconds: 10,
            max_analysis_attempts: 3,
            retry_backoff_base_ms: 500,
            bind_addr: "127.0.0.1:5810".to_string(),
            detector_command: "proctor-detect".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration for the given root folder
    pub fn load(root: &Path) -> Result<Self> {
        let path = proctor_common::config::config_file_path(root);
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let parsed: EngineConfig = toml::from_str(&content)
                .map_err(|e| proctor_common::Error::Config(format!("{}: {}", path.display(), e)))?;
            info!("Configuration loaded from {}", path.display());
            parsed
        } else {
            EngineConfig::default()
        };

        if let Ok(addr) = std::env::var("PROCTOR_BIND_ADDR") {
            if !addr.is_empty() {
                config.bind_addr = addr;
            }
        }
        if let Ok(cmd) = std::env::var("PROCTOR_DETECTOR_CMD") {
            if !cmd.is_empty() {
                config.detector_command = cmd;
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_duration_seconds <= 0 {
            return Err(proctor_common::Error::Config(
                "chunk_duration_seconds must be positive".to_string(),
            ));
        }
        if self.batch_size < 2 {
            return Err(proctor_common::Error::Config(
                "batch_size must be at least 2".to_string(),
            ));
        }
        if self.max_analysis_attempts < 1 {
            return Err(proctor_common::Error::Config(
                "max_analysis_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn session_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.session_lock_ttl_seconds)
    }

    pub fn upload_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.upload_lock_ttl_seconds)
    }

    pub fn retry_backoff_base(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_base_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: EngineConfig = toml::from_str("batch_size = 4").unwrap();
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.chunk_duration_seconds, 20);
    }

    #[test]
    fn rejects_single_chunk_batches() {
        let config: EngineConfig = toml::from_str("batch_size = 1").unwrap();
        assert!(config.validate().is_err());
    }
}
