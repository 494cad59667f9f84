//! CLI module - command definitions and handlers

mod config_cmd;
mod models;
mod results;
mod run;
mod tasks;

use clap::{Parser, Subcommand};

pub use config_cmd::ConfigArgs;
pub use models::ModelsArgs;
pub use results::ResultsArgs;
pub use run::RunArgs;
pub use tasks::TasksArgs;

/// MTEB - Massive Text Embedding Benchmark
#[derive(Parser)]
#[command(name = "mteb")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate a model on benchmark tasks
    Run(RunArgs),

    /// List available tasks
    Tasks(TasksArgs),

    /// List registered models
    Models(ModelsArgs),

    /// Summarize stored results
    Results(ResultsArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

impl Cli {
    /// Default log filter for the chosen verbosity
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "mteb=debug,info"
        } else if self.quiet {
            "warn"
        } else {
            "mteb=info,warn"
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Commands::Run(args) => run::run(args, self.quiet).await,
            Commands::Tasks(args) => tasks::run(args).await,
            Commands::Models(args) => models::run(args).await,
            Commands::Results(args) => results::run(args).await,
            Commands::Config(args) => config_cmd::run(args).await,
        }
    }
}
