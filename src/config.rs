//! Configuration file support for mteb
//!
//! Config file location: ~/.config/mteb/config.toml
//!
//! Example config:
//! ```toml
//! [embedding]
//! provider = "ollama"  # ollama, openai, gemini, local
//! host = "http://localhost:11434"
//! batch_size = 32
//!
//! [run]
//! output_folder = "results"
//! seed = 42
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub run: RunConfig,
}

/// Embedding backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider type: ollama, openai, gemini, local
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Backend model identifier when it differs from the benchmarked name
    /// (e.g. an Ollama tag serving `BAAI/bge-small-en-v1.5`)
    pub model: Option<String>,

    /// Host for Ollama (e.g., http://localhost:11434)
    pub host: Option<String>,

    /// Base URL for OpenAI-compatible APIs (e.g., http://localhost:1234/v1)
    pub base_url: Option<String>,

    /// API key for OpenAI/Gemini
    pub api_key: Option<String>,

    /// Sentences per embedding request
    pub batch_size: Option<usize>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            host: None,
            base_url: None,
            api_key: None,
            batch_size: None,
        }
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}

/// Benchmark run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Where result files are written
    #[serde(default = "default_output_folder")]
    pub output_folder: PathBuf,

    /// Dataset download cache (default: <cache_dir>/mteb/datasets)
    pub cache_dir: Option<PathBuf>,

    /// Local mirror of hub datasets, checked before downloading
    pub data_dir: Option<PathBuf>,

    /// Directory of local task definitions (each with a task.toml)
    pub tasks_dir: Option<PathBuf>,

    /// Re-run tasks that already have results
    #[serde(default)]
    pub overwrite_results: bool,

    /// Retrieval cutoffs (default: 1, 3, 5, 10, 20, 100, 1000)
    pub k_values: Option<Vec<usize>>,

    /// Seed for classification undersampling and k-means
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_folder: default_output_folder(),
            cache_dir: None,
            data_dir: None,
            tasks_dir: None,
            overwrite_results: false,
            k_values: None,
            seed: default_seed(),
        }
    }
}

fn default_output_folder() -> PathBuf {
    PathBuf::from("results")
}

fn default_seed() -> u64 {
    42
}

const EXAMPLE_CONFIG: &str = r#"# mteb configuration
# Location: ~/.config/mteb/config.toml

[embedding]
# Provider: ollama, openai, gemini, local (needs the local-embeddings feature)
provider = "ollama"

# Backend model identifier, when it differs from the benchmarked model name
# model = "bge-small-en"

# Ollama host (default: http://localhost:11434)
# host = "http://localhost:11434"

# OpenAI-compatible base URL
# base_url = "http://localhost:1234/v1"

# API key (for OpenAI/Gemini, or set OPENAI_API_KEY/GOOGLE_API_KEY env vars)
# api_key = "sk-..."

# Sentences per embedding request (default: 32)
# batch_size = 32

[run]
# Result files go to <output_folder>/<org__model>/<revision>/<task>.json
output_folder = "results"

# Dataset cache and optional local mirror
# cache_dir = "/tmp/mteb-cache"
# data_dir = "/data/mteb-mirror"

# Local task definitions
# tasks_dir = "./tasks"

overwrite_results = false

# Retrieval cutoffs
# k_values = [1, 3, 5, 10, 20, 100, 1000]

seed = 42
"#;

impl Config {
    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mteb")
            .join("config.toml")
    }

    /// Load config from file, returning defaults if not found
    pub fn load() -> Self {
        let path = Self::config_path();
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => {
                        tracing::debug!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config file: {}", e);
                }
            }
        }
        Self::default()
    }

    /// Write the commented example config; returns false when one exists
    /// and `force` is not set
    pub fn write_example(force: bool) -> anyhow::Result<bool> {
        let path = Self::config_path();
        if path.exists() && !force {
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, EXAMPLE_CONFIG)?;
        Ok(true)
    }
}
