//! S3 object-store client for trajectory artifacts.
//!
//! This crate provides:
//! - The `RemoteStore` contract the conversion pipeline is written against
//! - An `aws-sdk-s3` backed implementation
//! - Lazy, paginated key listing
//! - Bulk lifting of metadata JSON into the flat metadata prefix

pub mod client;
pub mod error;
pub mod operations;
pub mod store;

pub use client::{S3Store, StoreConfig};
pub use error::{StorageError, StorageResult};
pub use operations::{lift_metadata, LiftStats};
pub use store::{collect_keys, content_type_for, RemoteStore};
