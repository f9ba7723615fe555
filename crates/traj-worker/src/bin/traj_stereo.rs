//! Export SVO recordings as side-by-side stereo MP4s.
//!
//! Run one process per shard file, each with its own `TRAJ_SCRATCH_DIR`.

use clap::Parser;
use tracing::error;

use traj_worker::{init_tracing, run_conversion, ConvertArgs, PipelineVariant};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = ConvertArgs::parse();
    init_tracing();

    if let Err(e) = run_conversion(PipelineVariant::Stereo, args).await {
        error!("traj-stereo failed: {:#}", e);
        std::process::exit(1);
    }
}
