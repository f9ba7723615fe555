//! Shared command-line surface of the conversion binaries.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use traj_ledger::LedgerGuard;
use traj_media::ToolConverter;
use traj_storage::{collect_keys, S3Store, StoreConfig};

use crate::config::PipelineConfig;
use crate::pipeline::{ConversionPipeline, WorkSelection};
use crate::retry::{retry_async, RetryConfig};
use crate::variant::PipelineVariant;

/// Arguments of `traj-stitch` and `traj-stereo`.
#[derive(Debug, Clone, Parser)]
pub struct ConvertArgs {
    /// Shard file to process instead of the full ledger
    #[arg(value_parser = existing_file)]
    pub shard: Option<PathBuf>,

    /// Rescan the metadata prefix for new keys before converting
    #[arg(long, env = "TRAJ_REBUILD", conflicts_with = "shard")]
    pub rebuild: bool,

    /// Work through the errored bucket instead of pending
    #[arg(long, env = "TRAJ_RETRY_ERRORED")]
    pub retry_errored: bool,
}

impl ConvertArgs {
    pub fn selection(&self) -> WorkSelection {
        if self.retry_errored {
            WorkSelection::Errored
        } else {
            WorkSelection::Pending
        }
    }
}

/// Value parser accepting only paths to existing files.
pub fn existing_file(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);
    if path.is_file() {
        Ok(path)
    } else {
        Err(format!("file `{}` does not exist", value))
    }
}

/// Run a conversion binary to completion.
///
/// The ledger is written back on every way out of the run: normal
/// completion, a run error, and Ctrl-C.
pub async fn run_conversion(variant: PipelineVariant, args: ConvertArgs) -> anyhow::Result<()> {
    let config = PipelineConfig::from_env(variant);
    let ledger_path = args
        .shard
        .clone()
        .unwrap_or_else(|| config.ledger_path.clone());
    info!("traj-{} config: {:?}", variant, config);

    let mut ledger = LedgerGuard::open(&ledger_path)
        .with_context(|| format!("failed to open ledger {}", ledger_path.display()))?;

    let store = S3Store::new(StoreConfig::from_env(config.bucket.as_str())?).await?;
    let converter =
        ToolConverter::new(&config.stereo_exporter).with_timeout(config.convert_timeout);

    if args.rebuild {
        info!("Rebuilding ledger from s3://{}/{}", store.bucket(), config.source_prefix);
        let listing = collect_keys(&store, &config.source_prefix).await?;
        ledger.rebuild(listing)?;
        ledger.checkpoint()?;
    }

    let pipeline = ConversionPipeline::new(store, converter, config, variant);
    let run = tokio::select! {
        result = pipeline.run(&mut ledger, args.selection()) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    if run.is_none() {
        warn!("Received Ctrl-C, writing ledger before exit");
    }
    persist_final(&mut ledger).await?;

    match run {
        Some(Ok(summary)) => {
            info!(
                "traj-{} done: {} keys {} (ledger: {})",
                variant, summary.selected, summary.progress, summary.counts
            );
            Ok(())
        }
        Some(Err(e)) => Err(e.into()),
        None => anyhow::bail!("interrupted"),
    }
}

/// Write the ledger, retrying with backoff before giving up.
pub async fn persist_final(ledger: &mut LedgerGuard) -> anyhow::Result<()> {
    let config = RetryConfig::new(format!("persist ledger {}", ledger.path().display()));
    let guard: &LedgerGuard = ledger;

    match retry_async(&config, move || async move { guard.flush() })
        .await
        .into_result()
    {
        Ok(()) => {
            ledger.mark_clean();
            info!("Ledger written to {}", ledger.path().display());
            Ok(())
        }
        Err(e) => {
            error!("Giving up on writing ledger {}: {}", ledger.path().display(), e);
            Err(e).context("failed to persist ledger")
        }
    }
}
