//! Four-bucket work ledger.
//!
//! Every metadata key the pipeline has ever seen lives in exactly one of four
//! buckets: `pending`, `exported`, `non_usable` or `errored`. The buckets are
//! private and only change through methods that remove a key from all of them
//! before inserting it, so the partition holds by construction.
//!
//! On disk the ledger is a JSON object with one field per bucket. Older
//! ledgers written by the original annotation scripts used the bucket names
//! `new` and `failure-trajectories`; both are still accepted on load.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use traj_models::keys::is_legacy_timestamps_key;
use traj_models::{ledger_timestamp, KeyOutcome};

use crate::error::{LedgerError, LedgerResult};

/// Ledger bucket a key currently belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// Not yet attempted
    Pending,
    /// Converted and uploaded
    Exported,
    /// Source flagged unsuccessful, intentionally skipped
    NonUsable,
    /// Attempted and failed
    Errored,
}

impl Bucket {
    /// Get string representation of the bucket.
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Pending => "pending",
            Bucket::Exported => "exported",
            Bucket::NonUsable => "non_usable",
            Bucket::Errored => "errored",
        }
    }

    /// Check whether a rebuild must leave keys in this bucket alone.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Bucket::Pending)
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `[timestamp, message]` record of the last failure for a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry(pub String, pub String);

impl ErrorEntry {
    pub fn new(timestamp: impl Into<String>, message: impl Into<String>) -> Self {
        Self(timestamp.into(), message.into())
    }

    pub fn timestamp(&self) -> &str {
        &self.0
    }

    pub fn message(&self) -> &str {
        &self.1
    }
}

/// Bucket sizes of a ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketCounts {
    pub pending: usize,
    pub exported: usize,
    pub non_usable: usize,
    pub errored: usize,
}

impl BucketCounts {
    /// Total number of tracked keys.
    pub fn total(&self) -> usize {
        self.pending + self.exported + self.non_usable + self.errored
    }
}

impl std::fmt::Display for BucketCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} pending / {} exported / {} non-usable / {} errored",
            self.pending, self.exported, self.non_usable, self.errored
        )
    }
}

/// Counters from a rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    /// Keys in the listing
    pub listed: usize,
    /// Keys newly added to `pending`
    pub inserted: usize,
    /// Well-formed keys already tracked by the ledger
    pub already_tracked: usize,
    /// Directory markers and legacy timestamp files
    pub skipped: usize,
}

/// Entry of a single key, whichever bucket it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Entry {
    Pending(String),
    Exported(String),
    NonUsable(String),
    Errored(ErrorEntry),
}

impl Entry {
    fn from_outcome(outcome: &KeyOutcome, timestamp: String) -> Self {
        match outcome {
            KeyOutcome::Exported { .. } => Entry::Exported(timestamp),
            KeyOutcome::NonUsable => Entry::NonUsable(timestamp),
            KeyOutcome::Errored { message } => Entry::Errored(ErrorEntry(timestamp, message.clone())),
        }
    }

    fn bucket(&self) -> Bucket {
        match self {
            Entry::Pending(_) => Bucket::Pending,
            Entry::Exported(_) => Bucket::Exported,
            Entry::NonUsable(_) => Bucket::NonUsable,
            Entry::Errored(_) => Bucket::Errored,
        }
    }
}

/// Durable key → status ledger.
///
/// All four buckets must be present on disk and nothing else may be, so a
/// stray JSON file is never mistaken for an empty ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkCache {
    #[serde(alias = "new")]
    pending: BTreeMap<String, String>,
    exported: BTreeMap<String, String>,
    #[serde(alias = "failure-trajectories")]
    non_usable: BTreeMap<String, String>,
    errored: BTreeMap<String, ErrorEntry>,
}

impl WorkCache {
    /// Create an empty ledger with all four buckets initialized.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a ledger from disk.
    ///
    /// Fails with `LedgerError::Corrupt` when the file is not a valid ledger,
    /// including when a key appears in more than one bucket.
    pub fn load(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| LedgerError::io(path, e))?;

        let cache: WorkCache = serde_json::from_slice(&bytes)
            .map_err(|e| LedgerError::corrupt(path, e.to_string()))?;

        if let Some(key) = cache.first_overlap() {
            return Err(LedgerError::corrupt(
                path,
                format!("key {} appears in more than one bucket", key),
            ));
        }

        debug!("Loaded ledger {} ({})", path.display(), cache.counts());
        Ok(cache)
    }

    /// Load a ledger, starting empty only if the file does not exist yet.
    pub fn load_or_empty(path: impl AsRef<Path>) -> LedgerResult<Self> {
        match Self::load(path.as_ref()) {
            Ok(cache) => Ok(cache),
            Err(e) if e.is_not_found() => {
                info!("No ledger at {}, starting empty", path.as_ref().display());
                Ok(Self::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Write the ledger to disk atomically (temp file, fsync, rename).
    pub fn persist(&self, path: impl AsRef<Path>) -> LedgerResult<()> {
        let path = path.as_ref();
        let bytes = serde_json::to_vec(self)?;
        write_atomic(path, &bytes).map_err(|e| LedgerError::io(path, e))?;
        debug!("Persisted ledger {} ({})", path.display(), self.counts());
        Ok(())
    }

    /// Add every new well-formed metadata key from a listing to `pending`.
    ///
    /// Directory markers and legacy `*_timestamps.json` files are skipped.
    /// Any other key that is not a `.json` file aborts the rebuild before the
    /// ledger is touched. Keys already tracked in any bucket are left as is.
    pub fn rebuild<I, S>(&mut self, listing: I) -> LedgerResult<RebuildStats>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut stats = RebuildStats::default();
        let mut fresh = BTreeSet::new();

        for key in listing {
            let key = key.as_ref();
            stats.listed += 1;

            if key.ends_with('/') || is_legacy_timestamps_key(key) {
                stats.skipped += 1;
                continue;
            }

            if !key.ends_with(".json") {
                return Err(LedgerError::UnexpectedKey(key.to_string()));
            }

            if self.contains(key) {
                stats.already_tracked += 1;
            } else if fresh.insert(key.to_string()) {
                stats.inserted += 1;
            }
        }

        let now = ledger_timestamp();
        for key in fresh {
            self.pending.insert(key, now.clone());
        }

        info!(
            "Rebuilt ledger: {} listed, {} new, {} already tracked, {} skipped",
            stats.listed, stats.inserted, stats.already_tracked, stats.skipped
        );
        Ok(stats)
    }

    /// Move a key into the bucket implied by `outcome`, stamped with the current UTC time.
    ///
    /// Works from any bucket, including a previous terminal one.
    pub fn mark(&mut self, key: &str, outcome: &KeyOutcome) -> Bucket {
        let entry = Entry::from_outcome(outcome, ledger_timestamp());
        let bucket = entry.bucket();
        self.place(key, entry);
        bucket
    }

    /// Move every errored key back to `pending` for an explicit retry run.
    pub fn retry_errored(&mut self) -> usize {
        let errored = std::mem::take(&mut self.errored);
        let count = errored.len();
        let now = ledger_timestamp();
        for key in errored.into_keys() {
            self.pending.insert(key, now.clone());
        }
        count
    }

    /// Bucket a key currently lives in.
    pub fn status_of(&self, key: &str) -> Option<Bucket> {
        if self.pending.contains_key(key) {
            Some(Bucket::Pending)
        } else if self.exported.contains_key(key) {
            Some(Bucket::Exported)
        } else if self.non_usable.contains_key(key) {
            Some(Bucket::NonUsable)
        } else if self.errored.contains_key(key) {
            Some(Bucket::Errored)
        } else {
            None
        }
    }

    /// Check whether the ledger tracks a key in any bucket.
    pub fn contains(&self, key: &str) -> bool {
        self.status_of(key).is_some()
    }

    /// Snapshot of the keys in a bucket, in sorted order.
    pub fn keys_in(&self, bucket: Bucket) -> Vec<String> {
        match bucket {
            Bucket::Pending => self.pending.keys().cloned().collect(),
            Bucket::Exported => self.exported.keys().cloned().collect(),
            Bucket::NonUsable => self.non_usable.keys().cloned().collect(),
            Bucket::Errored => self.errored.keys().cloned().collect(),
        }
    }

    pub fn pending_keys(&self) -> Vec<String> {
        self.keys_in(Bucket::Pending)
    }

    pub fn errored_keys(&self) -> Vec<String> {
        self.keys_in(Bucket::Errored)
    }

    pub fn pending(&self) -> &BTreeMap<String, String> {
        &self.pending
    }

    pub fn exported(&self) -> &BTreeMap<String, String> {
        &self.exported
    }

    pub fn non_usable(&self) -> &BTreeMap<String, String> {
        &self.non_usable
    }

    pub fn errored(&self) -> &BTreeMap<String, ErrorEntry> {
        &self.errored
    }

    /// Bucket sizes.
    pub fn counts(&self) -> BucketCounts {
        BucketCounts {
            pending: self.pending.len(),
            exported: self.exported.len(),
            non_usable: self.non_usable.len(),
            errored: self.errored.len(),
        }
    }

    /// Total number of tracked keys.
    pub fn len(&self) -> usize {
        self.counts().total()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry of a key, whichever bucket it lives in.
    pub(crate) fn entry(&self, key: &str) -> Option<Entry> {
        if let Some(ts) = self.pending.get(key) {
            Some(Entry::Pending(ts.clone()))
        } else if let Some(ts) = self.exported.get(key) {
            Some(Entry::Exported(ts.clone()))
        } else if let Some(ts) = self.non_usable.get(key) {
            Some(Entry::NonUsable(ts.clone()))
        } else {
            self.errored.get(key).cloned().map(Entry::Errored)
        }
    }

    /// Put a key into exactly one bucket.
    pub(crate) fn place(&mut self, key: &str, entry: Entry) {
        self.remove(key);
        let key = key.to_string();
        match entry {
            Entry::Pending(ts) => {
                self.pending.insert(key, ts);
            }
            Entry::Exported(ts) => {
                self.exported.insert(key, ts);
            }
            Entry::NonUsable(ts) => {
                self.non_usable.insert(key, ts);
            }
            Entry::Errored(err) => {
                self.errored.insert(key, err);
            }
        }
    }

    fn remove(&mut self, key: &str) {
        self.pending.remove(key);
        self.exported.remove(key);
        self.non_usable.remove(key);
        self.errored.remove(key);
    }

    /// First key found in more than one bucket.
    fn first_overlap(&self) -> Option<&str> {
        let mut seen = BTreeSet::new();
        self.pending
            .keys()
            .chain(self.exported.keys())
            .chain(self.non_usable.keys())
            .chain(self.errored.keys())
            .find(|key| !seen.insert(key.as_str()))
            .map(String::as_str)
    }
}

/// Write `bytes` to `path` through a temp file in the same directory.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "bad filename"))?;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let tmp = parent.join(format!(".{}.tmp.{}.{}", file_name, std::process::id(), nanos));

    let written = (|| {
        let mut f = std::fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()
    })();

    if let Err(e) = written.and_then(|_| std::fs::rename(&tmp, path)) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}
