//! Ledger that persists itself on every exit path.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::cache::WorkCache;
use crate::error::LedgerResult;

/// Owns a `WorkCache` bound to its file.
///
/// Any mutable access marks the ledger dirty. A dirty ledger is written back
/// when the guard is dropped, so an early return, a propagated error or a
/// panic that unwinds still leaves the latest state on disk.
#[derive(Debug)]
pub struct LedgerGuard {
    cache: WorkCache,
    path: PathBuf,
    dirty: bool,
}

impl LedgerGuard {
    /// Load the ledger at `path`, starting empty if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        let path = path.into();
        let cache = WorkCache::load_or_empty(&path)?;
        Ok(Self::from_cache(cache, path))
    }

    /// Bind an in-memory ledger to a file.
    pub fn from_cache(cache: WorkCache, path: impl Into<PathBuf>) -> Self {
        Self {
            cache,
            path: path.into(),
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check whether there are changes not yet on disk.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the ledger now.
    pub fn checkpoint(&mut self) -> LedgerResult<()> {
        self.cache.persist(&self.path)?;
        self.dirty = false;
        Ok(())
    }

    /// Write the ledger without taking the guard mutably.
    ///
    /// Leaves the dirty flag alone; use from retry loops that only hold `&self`.
    pub fn flush(&self) -> LedgerResult<()> {
        self.cache.persist(&self.path)
    }

    /// Mark the ledger as saved, e.g. after a successful `flush`.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Release the ledger without writing it back.
    pub fn into_inner(mut self) -> WorkCache {
        self.dirty = false;
        std::mem::take(&mut self.cache)
    }
}

impl Deref for LedgerGuard {
    type Target = WorkCache;

    fn deref(&self) -> &WorkCache {
        &self.cache
    }
}

impl DerefMut for LedgerGuard {
    fn deref_mut(&mut self) -> &mut WorkCache {
        self.dirty = true;
        &mut self.cache
    }
}

impl Drop for LedgerGuard {
    fn drop(&mut self) {
        if !self.dirty {
            return;
        }
        match self.cache.persist(&self.path) {
            Ok(()) => debug!("Persisted ledger {} on drop", self.path.display()),
            Err(e) => error!("Failed to persist ledger {} on drop: {}", self.path.display(), e),
        }
    }
}
