//! Fuse left and right camera MP4s into annotation videos.

use clap::Parser;
use tracing::error;

use traj_worker::{init_tracing, run_conversion, ConvertArgs, PipelineVariant};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = ConvertArgs::parse();
    init_tracing();

    if let Err(e) = run_conversion(PipelineVariant::Stitch, args).await {
        error!("traj-stitch failed: {:#}", e);
        std::process::exit(1);
    }
}
