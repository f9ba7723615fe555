//! Conversion variants.

use std::path::{Path, PathBuf};

use traj_media::ConversionMode;
use traj_models::keys::svo_relpath;
use traj_models::View;

/// Which derived artifact a pipeline produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineVariant {
    /// Left and right MP4s fused side by side into one annotation video
    Stitch,
    /// Every SVO recording exported as a side-by-side stereo MP4
    Stereo,
}

impl PipelineVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineVariant::Stitch => "stitch",
            PipelineVariant::Stereo => "stereo",
        }
    }

    /// Camera views every usable trajectory must provide.
    pub fn required_views(&self) -> &'static [View] {
        match self {
            PipelineVariant::Stitch => &[View::Left, View::Right],
            PipelineVariant::Stereo => &[View::Left, View::Right, View::Wrist],
        }
    }

    /// Converter mode used for this variant.
    pub fn mode(&self) -> ConversionMode {
        match self {
            PipelineVariant::Stitch => ConversionMode::FusedTwoView,
            PipelineVariant::Stereo => ConversionMode::StereoSideBySide,
        }
    }

    /// Relative path of the raw file to download for a view's MP4 path.
    pub fn raw_relpath(&self, mp4_relpath: &str) -> String {
        match self {
            PipelineVariant::Stitch => mp4_relpath.to_string(),
            PipelineVariant::Stereo => svo_relpath(mp4_relpath),
        }
    }

    /// Fixed scratch location of a view's raw file, reused across keys.
    pub fn scratch_file(&self, scratch_dir: &Path, view: View) -> PathBuf {
        let ext = match self {
            PipelineVariant::Stitch => "mp4",
            PipelineVariant::Stereo => "svo",
        };
        scratch_dir.join(format!("{}.{}", view.as_str(), ext))
    }

    pub fn default_scratch_dir(&self) -> &'static str {
        match self {
            PipelineVariant::Stitch => "/tmp/r2d2-conversion",
            PipelineVariant::Stereo => "/tmp/r2d2-stereo-conversion",
        }
    }

    pub fn default_ledger_path(&self) -> &'static str {
        match self {
            PipelineVariant::Stitch => "X-CONVERT-CACHE.json",
            PipelineVariant::Stereo => "X-STEREO-CONVERT-CACHE.json",
        }
    }
}

impl std::fmt::Display for PipelineVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_paths() {
        let variant = PipelineVariant::Stereo;
        assert_eq!(
            variant.raw_relpath("success/2023-07-01/traj/recordings/MP4/22008760.mp4"),
            "success/2023-07-01/traj/recordings/SVO/22008760.svo"
        );
        assert_eq!(
            variant.scratch_file(Path::new("/tmp/s"), View::Wrist),
            PathBuf::from("/tmp/s/wrist.svo")
        );
        assert_eq!(variant.required_views().len(), 3);
    }

    #[test]
    fn test_stitch_paths() {
        let variant = PipelineVariant::Stitch;
        assert_eq!(variant.raw_relpath("MP4/a.mp4"), "MP4/a.mp4");
        assert_eq!(
            variant.scratch_file(Path::new("/tmp/s"), View::Left),
            PathBuf::from("/tmp/s/left.mp4")
        );
        assert_eq!(variant.mode(), ConversionMode::FusedTwoView);
    }
}
