//! Durable work ledger for the conversion pipeline.
//!
//! This crate provides:
//! - `WorkCache`, the four-bucket key status ledger and its JSON file format
//! - `LedgerGuard`, which persists the ledger on every exit path
//! - Shard splitting and merging for running workers in parallel

pub mod cache;
pub mod error;
pub mod guard;
pub mod shard;

pub use cache::{Bucket, BucketCounts, ErrorEntry, RebuildStats, WorkCache};
pub use error::{LedgerError, LedgerResult};
pub use guard::LedgerGuard;
pub use shard::{merge_shard, shard_file_name, split_shards, write_shards, MergeStats};
