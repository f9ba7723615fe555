//! Object-store contract.

use std::path::Path;

use async_trait::async_trait;
use futures::stream::{BoxStream, TryStreamExt};

use crate::error::StorageResult;

/// Minimal object-store surface used by the pipeline.
///
/// Every operation reports failure through `StorageResult`; implementations
/// never retry and never silently skip.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Lazily list every key under a prefix, paging under the hood.
    fn list<'a>(&'a self, prefix: &'a str) -> BoxStream<'a, StorageResult<String>>;

    /// Fetch a whole object into memory.
    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Download an object to a local path, creating parent directories.
    async fn download(&self, key: &str, local_path: &Path) -> StorageResult<()>;

    /// Upload a local file to a key.
    async fn upload(&self, local_path: &Path, key: &str) -> StorageResult<()>;

    /// Server-side copy of one key to another.
    async fn copy(&self, src_key: &str, dst_key: &str) -> StorageResult<()>;
}

/// Drain a listing into memory.
pub async fn collect_keys<S>(store: &S, prefix: &str) -> StorageResult<Vec<String>>
where
    S: RemoteStore + ?Sized,
{
    store.list(prefix).try_collect().await
}

/// MIME type for an uploaded artifact.
pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("mp4") => "video/mp4",
        Some("json") => "application/json",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}
