//! Models command - list registered models

use clap::Args;

use crate::models::{list_models, ModelLoader};

#[derive(Args)]
pub struct ModelsArgs {
    /// Show prompt tables
    #[arg(short, long)]
    pub detailed: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,
}

pub async fn run(args: ModelsArgs) -> anyhow::Result<()> {
    let models = list_models();

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    println!("Registered models");
    println!("{}", "=".repeat(50));
    for (i, meta) in models.iter().enumerate() {
        println!("   {}. {} ({})", i + 1, meta.name, meta.wrapper_name());
        println!("      revision: {}", meta.revision_dir_name());
        if !meta.languages.is_empty() {
            println!("      languages: {}", meta.languages.join(", "));
        }
        if args.detailed {
            let prompts = match &meta.loader {
                ModelLoader::Jina { prompts }
                | ModelLoader::Uae { prompts }
                | ModelLoader::SentenceTransformer { prompts } => Some(prompts),
                ModelLoader::Passthrough => None,
            };
            match prompts {
                Some(prompts) if !prompts.is_empty() => {
                    for (name, value) in prompts {
                        println!("      {} -> {:?}", name, value);
                    }
                }
                Some(_) => println!("      (no prompts)"),
                None => println!("      (prompt name = task name)"),
            }
        }
    }
    println!("{}", "=".repeat(50));
    println!("Unregistered models run without a prompt table.");

    Ok(())
}
