//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::variant::PipelineVariant;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bucket holding metadata, raw recordings and derived artifacts
    pub bucket: String,
    /// Flat prefix of per-trajectory metadata JSON
    pub source_prefix: String,
    /// Prefix for fused two-view videos
    pub destination_prefix: String,
    /// Prefix of raw lab uploads (`{raw_prefix}/{lab}/...`)
    pub raw_prefix: String,
    /// Directory for downloaded raw files and converter output
    pub scratch_dir: PathBuf,
    /// Full ledger file
    pub ledger_path: PathBuf,
    /// Bound on each object-store call
    pub store_timeout: Duration,
    /// Bound on each converter call
    pub convert_timeout: Duration,
    /// Write the ledger after this many keys
    pub checkpoint_every: usize,
    /// Stereo exporter executable
    pub stereo_exporter: PathBuf,
}

impl PipelineConfig {
    /// Default configuration for a variant.
    pub fn for_variant(variant: PipelineVariant) -> Self {
        Self {
            bucket: "r2d2-data".to_string(),
            source_prefix: "lab-uploads-json".to_string(),
            destination_prefix: "fused-annotation-mp4s".to_string(),
            raw_prefix: "lab-uploads".to_string(),
            scratch_dir: PathBuf::from(variant.default_scratch_dir()),
            ledger_path: PathBuf::from(variant.default_ledger_path()),
            store_timeout: Duration::from_secs(600),
            convert_timeout: Duration::from_secs(1800),
            checkpoint_every: 1,
            stereo_exporter: PathBuf::from("svo-export"),
        }
    }

    /// Create config from environment variables.
    pub fn from_env(variant: PipelineVariant) -> Self {
        let defaults = Self::for_variant(variant);
        Self {
            bucket: std::env::var("TRAJ_BUCKET").unwrap_or(defaults.bucket),
            source_prefix: std::env::var("TRAJ_SOURCE_PREFIX").unwrap_or(defaults.source_prefix),
            destination_prefix: std::env::var("TRAJ_DESTINATION_PREFIX")
                .unwrap_or(defaults.destination_prefix),
            raw_prefix: std::env::var("TRAJ_RAW_PREFIX").unwrap_or(defaults.raw_prefix),
            scratch_dir: std::env::var("TRAJ_SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
            ledger_path: std::env::var("TRAJ_LEDGER_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ledger_path),
            store_timeout: Duration::from_secs(
                std::env::var("TRAJ_STORE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            convert_timeout: Duration::from_secs(
                std::env::var("TRAJ_CONVERT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1800),
            ),
            checkpoint_every: std::env::var("TRAJ_CHECKPOINT_EVERY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(1),
            stereo_exporter: std::env::var("TRAJ_STEREO_EXPORTER")
                .map(PathBuf::from)
                .unwrap_or(defaults.stereo_exporter),
        }
    }

    /// Set the scratch directory.
    pub fn with_scratch_dir(mut self, scratch_dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = scratch_dir.into();
        self
    }

    /// Set the per-call store and converter timeouts.
    pub fn with_timeouts(mut self, store_timeout: Duration, convert_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self.convert_timeout = convert_timeout;
        self
    }
}
