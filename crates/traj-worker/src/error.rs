//! Worker error types.

use std::time::Duration;

use thiserror::Error;
use traj_models::View;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Failed to download {} view: {message}", .view.label())]
    DownloadFailed { view: View, message: String },

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("{operation} timed out after {limit:?}")]
    Timeout { operation: String, limit: Duration },

    #[error("Storage error: {0}")]
    Storage(#[from] traj_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] traj_media::MediaError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] traj_ledger::LedgerError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] traj_models::MetadataError),

    #[error("Key error: {0}")]
    Key(#[from] traj_models::KeyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn download_failed(view: View, msg: impl Into<String>) -> Self {
        Self::DownloadFailed {
            view,
            message: msg.into(),
        }
    }

    pub fn conversion_failed(msg: impl Into<String>) -> Self {
        Self::ConversionFailed(msg.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn timed_out(operation: impl Into<String>, limit: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            limit,
        }
    }

    /// Check if error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, WorkerError::Timeout { .. })
    }
}
