//! Split a ledger into shard files for parallel workers, and merge results back.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use traj_ledger::{merge_shard, split_shards, write_shards, LedgerGuard, WorkCache};
use traj_worker::cli::{existing_file, persist_final};
use traj_worker::init_tracing;

#[derive(Debug, Parser)]
#[command(name = "traj-shard")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Deal the pending keys of a ledger round-robin into shard files.
    Split {
        /// Number of shards to write
        #[arg(long)]
        shards: NonZeroUsize,

        /// Directory for `shard-NNN.json` files
        #[arg(long)]
        out_dir: PathBuf,

        /// Ledger to split
        #[arg(long, env = "TRAJ_LEDGER_PATH", value_parser = existing_file)]
        ledger: PathBuf,

        /// Also deal out errored keys, as pending, for a retry round
        #[arg(long, env = "TRAJ_RETRY_ERRORED")]
        retry_errored: bool,
    },
    /// Fold processed shard files back into a ledger.
    Merge {
        /// Ledger to update
        #[arg(long, env = "TRAJ_LEDGER_PATH")]
        ledger: PathBuf,

        /// Processed shard files
        #[arg(required = true, value_parser = existing_file)]
        shards: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing();

    match args.command {
        Command::Split {
            shards,
            out_dir,
            ledger,
            retry_errored,
        } => {
            let mut cache = WorkCache::load(&ledger)
                .with_context(|| format!("failed to load ledger {}", ledger.display()))?;
            if retry_errored {
                let requeued = cache.retry_errored();
                info!("Requeued {} errored keys for this split", requeued);
            }
            let paths = write_shards(&out_dir, &split_shards(&cache, shards))?;
            info!(
                "Split {} pending keys of {} into {} shards under {}",
                cache.counts().pending,
                ledger.display(),
                paths.len(),
                out_dir.display()
            );
        }
        Command::Merge { ledger, shards } => {
            let mut base = LedgerGuard::open(&ledger)
                .with_context(|| format!("failed to open ledger {}", ledger.display()))?;
            for path in &shards {
                let shard = WorkCache::load(path)
                    .with_context(|| format!("failed to load shard {}", path.display()))?;
                let stats = merge_shard(&mut base, &shard);
                info!(
                    "Merged {}: {} updated, {} still pending",
                    path.display(),
                    stats.updated,
                    stats.still_pending
                );
            }
            persist_final(&mut base).await?;
            info!("Ledger {}: {}", ledger.display(), base.counts());
        }
    }

    Ok(())
}
