//! External conversion tools for trajectory video artifacts.
//!
//! This crate provides:
//! - The `ArtifactConverter` contract used by the conversion pipeline
//! - Type-safe FFmpeg command building with multiple inputs
//! - A process runner with timeouts, progress parsing and stderr capture
//! - Side-by-side fusion of two camera views (`hstack`)
//! - Stereo export of SVO recordings through an external exporter

pub mod command;
pub mod converter;
pub mod error;
pub mod progress;
pub mod stereo;
pub mod stitch;

pub use command::{check_ffmpeg, FfmpegCommand, ToolRunner};
pub use converter::{ArtifactConverter, ConversionMode, ToolConverter};
pub use error::{MediaError, MediaResult};
pub use progress::FfmpegProgress;
pub use stereo::{export_stereo, stereo_output_path, StereoView};
pub use stitch::{fuse_views, fused_output_path};
