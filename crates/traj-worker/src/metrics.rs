//! Pipeline metrics.
//!
//! Counters go through the `metrics` facade and are no-ops until a recorder
//! is installed by the embedding process.

use metrics::counter;
use traj_models::KeyOutcome;

use crate::variant::PipelineVariant;

/// Metric names as constants for consistency.
pub mod names {
    pub const KEYS_PROCESSED_TOTAL: &str = "traj_keys_processed_total";
    pub const CHECKPOINT_FAILURES_TOTAL: &str = "traj_checkpoint_failures_total";
}

/// Record one processed key.
pub fn record_key_processed(variant: PipelineVariant, outcome: &KeyOutcome) {
    counter!(
        names::KEYS_PROCESSED_TOTAL,
        "variant" => variant.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a ledger checkpoint that could not be written.
pub fn record_checkpoint_failure(variant: PipelineVariant) {
    counter!(names::CHECKPOINT_FAILURES_TOTAL, "variant" => variant.as_str()).increment(1);
}
