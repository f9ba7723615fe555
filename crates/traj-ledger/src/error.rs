//! Ledger error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur while loading, rebuilding or persisting a ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Unexpected key in metadata listing: {0}")]
    UnexpectedKey(String),

    #[error("Ledger IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if the error means the ledger file does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }

    /// Check if the error is a corrupt ledger.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, LedgerError::Corrupt { .. })
    }
}
