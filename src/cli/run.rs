//! Run command - evaluate one model on a selection of tasks

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tracing::info;

use crate::config::Config;
use crate::datasets::DatasetSource;
use crate::embedding::{Backend, EmbeddingMode, EmbeddingProvider};
use crate::encoder::EncodeOptions;
use crate::models::resolve_model_meta;
use crate::results::{aggregate, render_table, ModelResults};
use crate::runner::{Mteb, RunOptions};
use crate::tasks::{get_tasks, LocalTask, Task, TaskType};

#[derive(Args)]
pub struct RunArgs {
    /// Model to evaluate (e.g. jinaai/jina-embeddings-v3)
    #[arg(short, long)]
    pub model: String,

    /// Model revision (default: the registered revision)
    #[arg(long)]
    pub revision: Option<String>,

    /// Tasks to run (comma-separated; default: all)
    #[arg(short, long, value_delimiter = ',')]
    pub tasks: Vec<String>,

    /// Task types to run (comma-separated, e.g. Retrieval,Clustering)
    #[arg(long, value_delimiter = ',')]
    pub task_types: Vec<String>,

    /// Languages to evaluate (comma-separated ISO 639-3, e.g. eng,deu)
    #[arg(short, long, value_delimiter = ',')]
    pub languages: Vec<String>,

    /// Directory of local task definitions
    #[arg(long)]
    pub tasks_dir: Option<PathBuf>,

    /// Embedding backend (default: from config)
    #[cfg(feature = "local-embeddings")]
    #[arg(long, value_parser = ["openai", "ollama", "gemini", "local"])]
    pub embedding_mode: Option<String>,

    /// Embedding backend (default: from config)
    #[cfg(not(feature = "local-embeddings"))]
    #[arg(long, value_parser = ["openai", "ollama", "gemini"])]
    pub embedding_mode: Option<String>,

    /// Backend model identifier, when it differs from --model
    #[arg(long)]
    pub embedding_model: Option<String>,

    /// Ollama host for embeddings
    #[arg(long, env = "OLLAMA_HOST")]
    pub embedding_host: Option<String>,

    /// OpenAI API base URL
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub embedding_api_base: Option<String>,

    /// API key for embedding service (OpenAI)
    #[arg(long, env = "OPENAI_API_KEY")]
    pub embedding_api_key: Option<String>,

    /// Google API key for Gemini embeddings
    #[arg(long, env = "GOOGLE_API_KEY")]
    pub google_api_key: Option<String>,

    /// Local model path (for local embedding mode)
    #[cfg(feature = "local-embeddings")]
    #[arg(long)]
    pub embedding_model_path: Option<String>,

    /// Sentences per embedding request
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Where result files are written
    #[arg(short, long)]
    pub output_folder: Option<PathBuf>,

    /// Dataset download cache
    #[arg(long, env = "MTEB_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Local mirror of hub datasets
    #[arg(long, env = "MTEB_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Re-run tasks that already have results
    #[arg(long)]
    pub overwrite: bool,

    /// Stop at the first failing task
    #[arg(long)]
    pub raise_error: bool,

    /// Retrieval cutoffs (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub k_values: Vec<usize>,

    /// Seed for sampling and clustering
    #[arg(long)]
    pub seed: Option<u64>,

    /// Drop retrieval hits whose id equals the query id
    #[arg(long)]
    pub ignore_identical_ids: bool,
}

pub async fn run(args: RunArgs, quiet: bool) -> anyhow::Result<()> {
    let config = Config::load();
    let meta = resolve_model_meta(&args.model, args.revision.clone());
    info!(
        "Evaluating {} (revision {}, {} wrapper)",
        meta.name,
        meta.revision_dir_name(),
        meta.wrapper_name()
    );

    let mode_name = args
        .embedding_mode
        .clone()
        .unwrap_or_else(|| config.embedding.provider.clone());
    let embedding_mode = match mode_name.as_str() {
        "openai" => EmbeddingMode::OpenAI {
            api_key: args.embedding_api_key.clone().or_else(|| config.embedding.api_key.clone()),
            base_url: args.embedding_api_base.clone().or_else(|| config.embedding.base_url.clone()),
        },
        "ollama" => EmbeddingMode::Ollama {
            host: args.embedding_host.clone().or_else(|| config.embedding.host.clone()),
        },
        "gemini" => EmbeddingMode::Gemini {
            api_key: args.google_api_key.clone().or_else(|| config.embedding.api_key.clone()),
        },
        #[cfg(feature = "local-embeddings")]
        "local" => EmbeddingMode::Local {
            revision: meta.revision.clone(),
            model_path: args.embedding_model_path.clone(),
        },
        other => anyhow::bail!("Unknown embedding mode: {}", other),
    };

    let backend_model = args
        .embedding_model
        .clone()
        .or_else(|| config.embedding.model.clone())
        .unwrap_or_else(|| meta.name.clone());
    let provider = EmbeddingProvider::new(backend_model, embedding_mode)?;
    info!("Backend {} ({} dims)", provider.model_name(), provider.dimensions());
    let backend: Arc<dyn Backend> = Arc::new(provider);
    let model = meta.load(backend);

    let mut local: Vec<Box<dyn Task>> = Vec::new();
    if let Some(dir) = args.tasks_dir.clone().or_else(|| config.run.tasks_dir.clone()) {
        for task in LocalTask::discover(&dir)? {
            local.push(Box::new(task));
        }
    }
    let task_types = args
        .task_types
        .iter()
        .map(|t| t.parse::<TaskType>())
        .collect::<Result<Vec<_>, _>>()?;
    let tasks = get_tasks(&args.tasks, &task_types, &args.languages, local)?;
    if tasks.is_empty() {
        anyhow::bail!("No tasks match the given filters");
    }
    info!("Running {} task(s)", tasks.len());

    let cache_dir = args
        .cache_dir
        .clone()
        .or_else(|| config.run.cache_dir.clone())
        .unwrap_or_else(DatasetSource::default_cache_dir);
    let data_dir = args.data_dir.clone().or_else(|| config.run.data_dir.clone());
    let source = DatasetSource::new(cache_dir, data_dir);

    let mut options = RunOptions {
        output_folder: args
            .output_folder
            .clone()
            .unwrap_or_else(|| config.run.output_folder.clone()),
        overwrite_results: args.overwrite || config.run.overwrite_results,
        raise_error: args.raise_error,
        languages: args.languages.clone(),
        show_progress: !quiet,
        ..RunOptions::default()
    };
    options.eval.encode = EncodeOptions::with_batch_size(
        args.batch_size
            .or(config.embedding.batch_size)
            .unwrap_or(EncodeOptions::default().batch_size),
    );
    options.eval.seed = args.seed.unwrap_or(config.run.seed);
    options.eval.ignore_identical_ids = args.ignore_identical_ids;
    if !args.k_values.is_empty() {
        options.eval.k_values = args.k_values.clone();
    } else if let Some(k_values) = &config.run.k_values {
        options.eval.k_values = k_values.clone();
    }

    let mut bench = Mteb::new(tasks);
    let summary = bench.run(model.as_ref(), &meta, &source, &options).await?;

    if !quiet {
        let stored = ModelResults {
            model: meta.name.clone(),
            revision: meta.revision_dir_name().to_string(),
            tasks: summary.results.clone(),
        };
        println!();
        println!("{}", render_table(&aggregate(&[stored])));
        println!();
        println!("Results written to {}", options.output_folder.display());
    }

    if !summary.failed.is_empty() {
        for (task, error) in &summary.failed {
            eprintln!("FAILED {}: {}", task, error);
        }
        anyhow::bail!("{} task(s) failed", summary.failed.len());
    }

    Ok(())
}
