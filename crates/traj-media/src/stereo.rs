//! Stereo export of SVO recordings.
//!
//! The stereo camera SDK is driven through an external exporter executable
//! that reads one `.svo` recording and writes one MP4. Each invocation
//! succeeds or fails as a unit.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::command::ToolRunner;
use crate::error::{MediaError, MediaResult};

/// Which stereo channel(s) the exporter renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StereoView {
    Left,
    Right,
    /// Both channels side by side
    #[default]
    Both,
}

impl StereoView {
    pub fn as_str(&self) -> &'static str {
        match self {
            StereoView::Left => "left",
            StereoView::Right => "right",
            StereoView::Both => "both",
        }
    }
}

/// Path the exporter writes for a recording: `{output_dir}/{stem}-stereo.mp4`.
pub fn stereo_output_path(input: &Path, output_dir: &Path) -> MediaResult<PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| MediaError::invalid_input(format!("no file stem: {}", input.display())))?;
    Ok(output_dir.join(format!("{}-stereo.mp4", stem)))
}

/// Exporter arguments for one recording.
pub fn export_args(input: &Path, output: &Path, view: StereoView) -> Vec<String> {
    vec![
        "--input".to_string(),
        input.to_string_lossy().to_string(),
        "--output".to_string(),
        output.to_string_lossy().to_string(),
        "--view".to_string(),
        view.as_str().to_string(),
    ]
}

/// Export one SVO recording to MP4 with the given exporter executable.
pub async fn export_stereo(
    runner: &ToolRunner,
    exporter: &Path,
    input: &Path,
    output_dir: &Path,
    view: StereoView,
) -> MediaResult<PathBuf> {
    if !input.exists() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }

    tokio::fs::create_dir_all(output_dir).await?;
    let output = stereo_output_path(input, output_dir)?;

    // Stale output from a previous key must not be mistaken for a fresh export.
    if output.exists() {
        tokio::fs::remove_file(&output).await?;
    }

    runner
        .run_tool(exporter, &export_args(input, &output, view))
        .await?;

    if !output.exists() {
        return Err(MediaError::MissingOutput(output));
    }

    info!("Exported {} ({}) to {}", input.display(), view.as_str(), output.display());
    Ok(output)
}
