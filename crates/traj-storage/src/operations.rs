//! High-level storage operations.

use futures::StreamExt;
use tracing::{info, warn};

use traj_models::keys::{file_name, join_key};

use crate::error::StorageResult;
use crate::store::RemoteStore;

/// Counters from a metadata lift.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiftStats {
    /// Keys seen under the raw prefix
    pub scanned: u64,
    /// Metadata files copied into the flat prefix
    pub copied: u64,
    /// Copies that failed
    pub failed: u64,
}

/// Copy every metadata JSON under `raw_prefix` into the flat `metadata_prefix`.
///
/// Raw uploads nest metadata next to the recordings
/// (`{raw}/{lab}/success/{date}/{traj}/metadata_*.json`); the conversion
/// pipeline scans a single flat prefix instead. Individual copy failures are
/// counted and logged; a listing failure aborts the lift.
pub async fn lift_metadata<S>(
    store: &S,
    raw_prefix: &str,
    metadata_prefix: &str,
) -> StorageResult<LiftStats>
where
    S: RemoteStore + ?Sized,
{
    info!("Lifting metadata JSON from {} into {}", raw_prefix, metadata_prefix);

    let mut stats = LiftStats::default();
    let mut listing = store.list(raw_prefix);

    while let Some(key) = listing.next().await {
        let key = key?;
        stats.scanned += 1;

        if !key.ends_with(".json") {
            continue;
        }

        let dst = match file_name(&key) {
            Ok(name) => join_key(metadata_prefix, name),
            Err(e) => {
                warn!("Skipping {}: {}", key, e);
                stats.failed += 1;
                continue;
            }
        };

        match store.copy(&key, &dst).await {
            Ok(()) => stats.copied += 1,
            Err(e) => {
                warn!("Failed to copy {} to {}: {}", key, dst, e);
                stats.failed += 1;
            }
        }
    }

    info!(
        "Lift complete: {} scanned, {} copied, {} failed",
        stats.scanned, stats.copied, stats.failed
    );
    Ok(stats)
}
