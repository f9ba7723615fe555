//! Artifact converter contract and its tool-backed implementation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::command::ToolRunner;
use crate::error::{MediaError, MediaResult};
use crate::stereo::{export_stereo, StereoView};
use crate::stitch::fuse_views;

/// Kind of artifact to derive from raw recordings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionMode {
    /// Two MP4 views stacked horizontally into one video
    FusedTwoView,
    /// One SVO recording exported as a side-by-side stereo MP4
    StereoSideBySide,
}

impl ConversionMode {
    /// Number of input files one invocation takes.
    pub fn input_count(&self) -> usize {
        match self {
            ConversionMode::FusedTwoView => 2,
            ConversionMode::StereoSideBySide => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionMode::FusedTwoView => "fused-two-view",
            ConversionMode::StereoSideBySide => "stereo-side-by-side",
        }
    }
}

impl std::fmt::Display for ConversionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Converts local raw files into local derived artifacts.
///
/// One call either produces all of its outputs or fails as a unit.
/// Implementations do not retry.
#[async_trait]
pub trait ArtifactConverter: Send + Sync {
    async fn convert(
        &self,
        inputs: &[PathBuf],
        output_dir: &Path,
        mode: ConversionMode,
    ) -> MediaResult<Vec<PathBuf>>;
}

/// Converter backed by `ffmpeg` and the stereo exporter executable.
#[derive(Debug, Clone)]
pub struct ToolConverter {
    runner: ToolRunner,
    stereo_exporter: PathBuf,
}

impl ToolConverter {
    /// Create a converter using the given stereo exporter executable.
    pub fn new(stereo_exporter: impl Into<PathBuf>) -> Self {
        Self {
            runner: ToolRunner::new(),
            stereo_exporter: stereo_exporter.into(),
        }
    }

    /// Bound every tool invocation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.runner = self.runner.with_timeout(timeout);
        self
    }
}

#[async_trait]
impl ArtifactConverter for ToolConverter {
    async fn convert(
        &self,
        inputs: &[PathBuf],
        output_dir: &Path,
        mode: ConversionMode,
    ) -> MediaResult<Vec<PathBuf>> {
        if inputs.len() != mode.input_count() {
            return Err(MediaError::invalid_input(format!(
                "{} takes {} input(s), got {}",
                mode,
                mode.input_count(),
                inputs.len()
            )));
        }

        match mode {
            ConversionMode::FusedTwoView => {
                let fused = fuse_views(&self.runner, &inputs[0], &inputs[1], output_dir).await?;
                Ok(vec![fused])
            }
            ConversionMode::StereoSideBySide => {
                let exported = export_stereo(
                    &self.runner,
                    &self.stereo_exporter,
                    &inputs[0],
                    output_dir,
                    StereoView::Both,
                )
                .await?;
                Ok(vec![exported])
            }
        }
    }
}
