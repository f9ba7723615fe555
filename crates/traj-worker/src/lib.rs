//! Trajectory artifact conversion pipeline.
//!
//! This crate provides:
//! - The incremental, ledger-backed conversion loop for both variants
//!   (fused two-view MP4s and stereo exports of SVO recordings)
//! - Per-call timeouts and per-key failure isolation
//! - Environment configuration, tracing setup and metrics
//! - The shared command-line surface of the `traj-*` binaries

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod variant;

pub use cli::{run_conversion, ConvertArgs};
pub use config::PipelineConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::{init_tracing, KeyLogger};
pub use pipeline::{ConversionPipeline, ProgressCounts, RunSummary, WorkSelection};
pub use retry::{retry_async, RetryConfig, RetryResult};
pub use variant::PipelineVariant;
