//! Trajectory metadata records.
//!
//! Each recorded trajectory is described by a JSON record uploaded next to the
//! raw recordings. Only the fields the converter needs are modelled here;
//! everything else in the record is ignored.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for metadata parsing.
pub type MetadataResult<T> = Result<T, MetadataError>;

/// Errors raised while interpreting a metadata record.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Malformed metadata JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Metadata has no path for the {0} view")]
    MissingView(View),
}

/// Camera view belonging to a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Left,
    Right,
    Wrist,
}

impl View {
    /// Get string representation of the view.
    pub fn as_str(&self) -> &'static str {
        match self {
            View::Left => "left",
            View::Right => "right",
            View::Wrist => "wrist",
        }
    }

    /// Capitalized label used in ledger error messages.
    pub fn label(&self) -> &'static str {
        match self {
            View::Left => "Left",
            View::Right => "Right",
            View::Wrist => "Wrist",
        }
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-trajectory metadata produced by the upstream recording pipeline.
///
/// Media paths are relative to `{raw_prefix}/{lab}` in the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Whether the trajectory is usable
    pub success: bool,
    /// Lab namespace under the raw-data prefix
    pub lab: String,
    /// Relative path of the left camera MP4
    #[serde(alias = "left")]
    pub left_mp4_path: Option<String>,
    /// Relative path of the right camera MP4
    #[serde(alias = "right")]
    pub right_mp4_path: Option<String>,
    /// Relative path of the wrist camera MP4
    #[serde(alias = "wrist")]
    pub wrist_mp4_path: Option<String>,
}

impl MetadataRecord {
    /// Parse a record from raw JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> MetadataResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Relative MP4 path for a view.
    pub fn media_path(&self, view: View) -> MetadataResult<&str> {
        let path = match view {
            View::Left => self.left_mp4_path.as_deref(),
            View::Right => self.right_mp4_path.as_deref(),
            View::Wrist => self.wrist_mp4_path.as_deref(),
        };

        path.filter(|p| !p.is_empty())
            .ok_or(MetadataError::MissingView(view))
    }

    /// Bucket prefix that relative media paths resolve against.
    pub fn lab_prefix(&self, raw_prefix: &str) -> String {
        format!("{}/{}", raw_prefix.trim_end_matches('/'), self.lab)
    }
}
