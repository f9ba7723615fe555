//! Object key naming.
//!
//! Derived artifact names are computed from the source keys alone so that
//! re-running a conversion always overwrites the same destination objects.

use thiserror::Error;

/// Errors that can occur while deriving names from keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("Key has no file name: {0}")]
    NoFileName(String),

    #[error("Cannot extract trajectory id from {0}")]
    NoTrajectoryId(String),

    #[error("Not an MP4 path: {0}")]
    NotMp4(String),
}

/// Result type for key derivation.
pub type KeyResult<T> = Result<T, KeyError>;

/// Suffix of the per-trajectory timestamp files an old recorder version wrote
/// next to the metadata JSON.
const LEGACY_TIMESTAMPS_SUFFIX: &str = "_timestamps.json";

/// Check whether a key is a legacy `*_timestamps.json` artifact.
pub fn is_legacy_timestamps_key(key: &str) -> bool {
    key.ends_with(LEGACY_TIMESTAMPS_SUFFIX)
}

/// Last path component of a key.
pub fn file_name(key: &str) -> KeyResult<&str> {
    key.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| KeyError::NoFileName(key.to_string()))
}

/// File name of a key without its extension.
pub fn file_stem(key: &str) -> KeyResult<&str> {
    let name = file_name(key)?;
    Ok(match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    })
}

/// Extract the trajectory identifier from a metadata key.
///
/// Metadata files are named `{prefix}_{trajectory_id}_{suffix}.json`; the
/// identifier is the second `_`-separated token of the stem.
pub fn trajectory_id(metadata_key: &str) -> KeyResult<&str> {
    file_stem(metadata_key)?
        .split('_')
        .nth(1)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| KeyError::NoTrajectoryId(metadata_key.to_string()))
}

/// Destination key of a fused two-view video.
pub fn fused_artifact_key(destination_prefix: &str, metadata_key: &str) -> KeyResult<String> {
    let id = trajectory_id(metadata_key)?;
    Ok(format!("{}/{}.mp4", destination_prefix.trim_end_matches('/'), id))
}

/// Relative path of the stereo recording that an MP4 was rendered from.
///
/// Recordings live in a sibling `SVO` directory with a `.svo` extension.
pub fn svo_relpath(mp4_relpath: &str) -> String {
    mp4_relpath.replace("MP4", "SVO").replace(".mp4", ".svo")
}

/// Relative path of the side-by-side stereo export for an MP4.
pub fn stereo_relpath(mp4_relpath: &str) -> KeyResult<String> {
    let stem = mp4_relpath
        .strip_suffix(".mp4")
        .ok_or_else(|| KeyError::NotMp4(mp4_relpath.to_string()))?;
    Ok(format!("{}-stereo.mp4", stem))
}

/// Join a prefix and a relative path into an object key.
pub fn join_key(prefix: &str, relpath: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let relpath = relpath.trim_start_matches('/');
    if prefix.is_empty() {
        relpath.to_string()
    } else {
        format!("{}/{}", prefix, relpath)
    }
}
