//! Copy per-trajectory metadata JSON from the raw uploads into the flat metadata prefix.

use anyhow::Result;
use clap::Parser;
use tracing::info;

use traj_storage::{lift_metadata, S3Store, StoreConfig};
use traj_worker::init_tracing;

#[derive(Debug, Parser)]
#[command(name = "traj-lift-metadata")]
struct Args {
    /// Prefix holding raw lab uploads
    #[arg(long, env = "TRAJ_RAW_PREFIX", default_value = "lab-uploads")]
    raw_prefix: String,

    /// Flat prefix the conversion pipelines scan
    #[arg(long, env = "TRAJ_SOURCE_PREFIX", default_value = "lab-uploads-json")]
    metadata_prefix: String,

    /// Bucket holding both prefixes
    #[arg(long, env = "TRAJ_BUCKET", default_value = "r2d2-data")]
    bucket: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing();

    let store = S3Store::new(StoreConfig::from_env(args.bucket)?).await?;
    let stats = lift_metadata(&store, &args.raw_prefix, &args.metadata_prefix).await?;

    info!(
        "Lifted metadata: {} scanned, {} copied, {} failed",
        stats.scanned, stats.copied, stats.failed
    );
    if stats.failed > 0 {
        anyhow::bail!("{} metadata copies failed", stats.failed);
    }
    Ok(())
}
