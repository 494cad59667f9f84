//! MTEB - Massive Text Embedding Benchmark
//!
//! A single-binary CLI for evaluating text-embedding models on retrieval,
//! classification and clustering tasks.

mod cli;
mod config;
mod datasets;
mod embedding;
mod encoder;
mod error;
mod evaluation;
mod http;
mod models;
mod results;
mod runner;
mod tasks;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG wins over the verbosity flags
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    cli.run().await
}
