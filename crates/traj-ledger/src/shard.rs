//! Splitting a ledger across parallel workers and folding the results back.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::cache::{Entry, WorkCache};
use crate::error::{LedgerError, LedgerResult};

/// File name of shard `index` inside a shard directory.
pub fn shard_file_name(index: usize) -> String {
    format!("shard-{:03}.json", index)
}

/// Split the pending keys of `cache` into exactly `n` shards.
///
/// Keys are dealt round-robin in sorted order, so shard sizes differ by at
/// most one and the assignment is stable for a given ledger. Each shard keeps
/// the original pending timestamps and has its other buckets empty.
pub fn split_shards(cache: &WorkCache, n: NonZeroUsize) -> Vec<WorkCache> {
    let mut shards = vec![WorkCache::new(); n.get()];
    for (i, (key, timestamp)) in cache.pending().iter().enumerate() {
        shards[i % n.get()].place(key, Entry::Pending(timestamp.clone()));
    }
    shards
}

/// Write shards as `shard-000.json`, `shard-001.json`, ... under `dir`.
pub fn write_shards(dir: impl AsRef<Path>, shards: &[WorkCache]) -> LedgerResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(|e| LedgerError::io(dir, e))?;

    let mut paths = Vec::with_capacity(shards.len());
    for (i, shard) in shards.iter().enumerate() {
        let path = dir.join(shard_file_name(i));
        shard.persist(&path)?;
        info!("Wrote {} ({} pending)", path.display(), shard.counts().pending);
        paths.push(path);
    }
    Ok(paths)
}

/// Counters from folding one shard into a base ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Keys whose terminal shard entry replaced the base entry
    pub updated: usize,
    /// Keys still pending in the shard
    pub still_pending: usize,
}

/// Fold a processed shard back into `base`.
///
/// Every exported, non-usable or errored entry in the shard replaces whatever
/// `base` holds for that key. Keys still pending in the shard leave `base`
/// untouched.
pub fn merge_shard(base: &mut WorkCache, shard: &WorkCache) -> MergeStats {
    let mut stats = MergeStats::default();

    let keys = shard
        .exported()
        .keys()
        .chain(shard.non_usable().keys())
        .chain(shard.errored().keys());

    for key in keys {
        if let Some(entry) = shard.entry(key) {
            base.place(key, entry);
            stats.updated += 1;
        }
    }
    stats.still_pending = shard.counts().pending;

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Bucket;
    use std::collections::BTreeSet;
    use tempfile::TempDir;
    use traj_models::KeyOutcome;

    fn ledger_with(keys: &[&str]) -> WorkCache {
        let mut cache = WorkCache::new();
        cache.rebuild(keys.iter().copied()).unwrap();
        cache
    }

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_split_is_disjoint_cover() {
        let keys: Vec<String> = (0..10).map(|i| format!("k{i:02}.json")).collect();
        let mut cache = ledger_with(&keys.iter().map(String::as_str).collect::<Vec<_>>());
        cache.mark("k00.json", &KeyOutcome::NonUsable);

        let shards = split_shards(&cache, nz(3));
        assert_eq!(shards.len(), 3);

        let mut seen = BTreeSet::new();
        for shard in &shards {
            let counts = shard.counts();
            assert_eq!(counts.exported + counts.non_usable + counts.errored, 0);
            for key in shard.pending_keys() {
                assert!(seen.insert(key), "key in two shards");
            }
        }
        assert_eq!(seen.into_iter().collect::<Vec<_>>(), cache.pending_keys());

        let sizes: Vec<usize> = shards.iter().map(|s| s.counts().pending).collect();
        assert_eq!(sizes, vec![3, 3, 3]);
    }

    #[test]
    fn test_split_more_shards_than_keys() {
        let cache = ledger_with(&["a.json", "b.json"]);
        let shards = split_shards(&cache, nz(5));

        assert_eq!(shards.len(), 5);
        assert_eq!(shards[0].pending_keys(), vec!["a.json"]);
        assert_eq!(shards[1].pending_keys(), vec!["b.json"]);
        assert!(shards[2..].iter().all(WorkCache::is_empty));
    }

    #[test]
    fn test_split_keeps_pending_timestamps() {
        let cache = ledger_with(&["a.json"]);
        let shards = split_shards(&cache, nz(1));
        assert_eq!(shards[0].pending()["a.json"], cache.pending()["a.json"]);
    }

    #[test]
    fn test_split_after_retry_errored_and_merge_back() {
        let mut base = ledger_with(&["a.json", "b.json", "c.json"]);
        base.mark("a.json", &KeyOutcome::errored("timeout"));
        base.mark("b.json", &KeyOutcome::NonUsable);

        let mut requeued = base.clone();
        assert_eq!(requeued.retry_errored(), 1);
        let mut shards = split_shards(&requeued, nz(2));

        let dealt: BTreeSet<String> = shards.iter().flat_map(|s| s.pending_keys()).collect();
        assert_eq!(dealt, BTreeSet::from(["a.json".to_string(), "c.json".to_string()]));

        for shard in &mut shards {
            if shard.contains("a.json") {
                shard.mark("a.json", &KeyOutcome::Exported { artifacts: vec![] });
            }
        }
        for shard in &shards {
            merge_shard(&mut base, shard);
        }

        assert_eq!(base.status_of("a.json"), Some(Bucket::Exported));
        assert_eq!(base.status_of("b.json"), Some(Bucket::NonUsable));
        assert_eq!(base.status_of("c.json"), Some(Bucket::Pending));
    }

    #[test]
    fn test_write_shards_names() {
        let dir = TempDir::new().unwrap();
        let shards = split_shards(&ledger_with(&["a.json", "b.json"]), nz(2));

        let paths = write_shards(dir.path().join("shards"), &shards).unwrap();
        assert_eq!(paths[0].file_name().unwrap(), "shard-000.json");
        assert_eq!(paths[1].file_name().unwrap(), "shard-001.json");
        assert_eq!(WorkCache::load(&paths[1]).unwrap(), shards[1]);
    }

    #[test]
    fn test_merge_shard_results() {
        let mut base = ledger_with(&["a.json", "b.json", "c.json", "d.json"]);
        base.mark("d.json", &KeyOutcome::errored("old failure"));

        let mut shards = split_shards(&base, nz(1));
        let shard = &mut shards[0];
        shard.mark("a.json", &KeyOutcome::Exported { artifacts: vec![] });
        shard.mark("b.json", &KeyOutcome::errored("download failed"));

        let stats = merge_shard(&mut base, shard);
        assert_eq!(stats, MergeStats { updated: 2, still_pending: 1 });

        assert_eq!(base.status_of("a.json"), Some(Bucket::Exported));
        assert_eq!(base.status_of("b.json"), Some(Bucket::Errored));
        assert_eq!(base.status_of("c.json"), Some(Bucket::Pending));
        assert_eq!(base.errored()["d.json"].message(), "Error: old failure");
        assert_eq!(base.len(), 4);
    }
}
