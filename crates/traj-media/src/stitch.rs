//! Side-by-side fusion of two camera views.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::command::{FfmpegCommand, ToolRunner};
use crate::error::{MediaError, MediaResult};

/// File name of the fused output inside the output directory.
pub const FUSED_FILE_NAME: &str = "fused.mp4";

/// Path the fused video is written to.
pub fn fused_output_path(output_dir: &Path) -> PathBuf {
    output_dir.join(FUSED_FILE_NAME)
}

/// Build the `hstack` command for two views.
///
/// `-vsync 2` drops duplicated frames so the two cameras' slightly different
/// timestamps do not stall the stack filter.
pub fn fuse_command(left: &Path, right: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(output)
        .input(left)
        .input(right)
        .vsync("2")
        .filter_complex("hstack")
}

/// Stack `left` and `right` horizontally into `{output_dir}/fused.mp4`.
pub async fn fuse_views(
    runner: &ToolRunner,
    left: &Path,
    right: &Path,
    output_dir: &Path,
) -> MediaResult<PathBuf> {
    for input in [left, right] {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
    }

    tokio::fs::create_dir_all(output_dir).await?;
    let output = fused_output_path(output_dir);
    if output.exists() {
        tokio::fs::remove_file(&output).await?;
    }

    runner.run_ffmpeg(&fuse_command(left, right, &output)).await?;

    if !output.exists() {
        return Err(MediaError::MissingOutput(output));
    }

    info!("Fused {} + {} into {}", left.display(), right.display(), output.display());
    Ok(output)
}
