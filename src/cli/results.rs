//! Results command - aggregate stored result files into a table

use std::path::PathBuf;

use clap::Args;

use crate::config::Config;
use crate::results::{aggregate, load_all, render_table};

#[derive(Args)]
pub struct ResultsArgs {
    /// Results folder (default: from config)
    #[arg(short, long)]
    pub output_folder: Option<PathBuf>,

    /// Only models whose name contains this string
    #[arg(short, long)]
    pub model: Option<String>,

    /// Output format (text, json)
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,
}

pub async fn run(args: ResultsArgs) -> anyhow::Result<()> {
    let folder = args
        .output_folder
        .unwrap_or_else(|| Config::load().run.output_folder);

    let mut results = load_all(&folder)?;
    if let Some(filter) = &args.model {
        results.retain(|r| r.model.contains(filter.as_str()));
    }

    if results.is_empty() {
        println!("No results found in {}", folder.display());
        return Ok(());
    }

    let summaries = aggregate(&results);
    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        println!("{}", render_table(&summaries));
    }

    Ok(())
}
