//! Shared data models for the trajectory conversion pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Trajectory metadata records and camera views
//! - Per-key conversion outcomes
//! - Ledger timestamps
//! - Deterministic key naming for raw and derived artifacts

pub mod keys;
pub mod metadata;
pub mod outcome;
pub mod timestamp;

// Re-export common types
pub use keys::{is_legacy_timestamps_key, trajectory_id, KeyError, KeyResult};
pub use metadata::{MetadataError, MetadataRecord, MetadataResult, View};
pub use outcome::KeyOutcome;
pub use timestamp::{ledger_timestamp, LEDGER_TIMESTAMP_FORMAT};
