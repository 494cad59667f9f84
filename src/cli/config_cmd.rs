//! Config command - manage mteb configuration

use clap::{Args, Subcommand};

use crate::config::Config;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Initialize config file with defaults
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Show config file path
    Path,
}

pub async fn run(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommands::Show => {
            let config = Config::load();
            let path = Config::config_path();

            if path.exists() {
                println!("Config file: {}", path.display());
            } else {
                println!("Config file: {} (not found, using defaults)", path.display());
            }
            println!();
            println!("[embedding]");
            println!("provider = \"{}\"", config.embedding.provider);
            if let Some(model) = &config.embedding.model {
                println!("model = \"{}\"", model);
            }
            if let Some(host) = &config.embedding.host {
                println!("host = \"{}\"", host);
            }
            if let Some(base_url) = &config.embedding.base_url {
                println!("base_url = \"{}\"", base_url);
            }
            if config.embedding.api_key.is_some() {
                println!("api_key = \"***\"");
            }
            if let Some(batch_size) = config.embedding.batch_size {
                println!("batch_size = {}", batch_size);
            }
            println!();
            println!("[run]");
            println!("output_folder = \"{}\"", config.run.output_folder.display());
            if let Some(cache_dir) = &config.run.cache_dir {
                println!("cache_dir = \"{}\"", cache_dir.display());
            }
            if let Some(data_dir) = &config.run.data_dir {
                println!("data_dir = \"{}\"", data_dir.display());
            }
            if let Some(tasks_dir) = &config.run.tasks_dir {
                println!("tasks_dir = \"{}\"", tasks_dir.display());
            }
            println!("overwrite_results = {}", config.run.overwrite_results);
            if let Some(k_values) = &config.run.k_values {
                println!("k_values = {:?}", k_values);
            }
            println!("seed = {}", config.run.seed);
        }

        ConfigCommands::Init { force } => {
            let path = Config::config_path();

            if !Config::write_example(force)? {
                anyhow::bail!(
                    "Config file already exists at {}. Use --force to overwrite.",
                    path.display()
                );
            }

            println!("Created config file at {}", path.display());
            println!();
            println!("Edit the file to pick the default embedding backend and output folder.");
            println!();
            println!("Common configurations:");
            println!();
            println!("  # Ollama (local)");
            println!("  provider = \"ollama\"");
            println!("  model = \"jina/jina-embeddings-v2-base-en\"  # backend tag for the benchmarked model");
            println!();
            println!("  # OpenAI-compatible server");
            println!("  provider = \"openai\"");
            println!("  base_url = \"http://localhost:1234/v1\"");
            println!();
            println!("  # Gemini");
            println!("  provider = \"gemini\"");
            println!("  # api_key = \"...\"  # or set GOOGLE_API_KEY env var");
        }

        ConfigCommands::Path => {
            println!("{}", Config::config_path().display());
        }
    }

    Ok(())
}
