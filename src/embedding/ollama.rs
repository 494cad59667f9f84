//! Ollama embedding backend

use std::env;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::http::{check_response, create_client};

/// Ollama embedding backend (`/api/embed`)
pub struct OllamaEmbedding {
    client: Client,
    host: String,
    model_name: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    truncate: bool,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedding {
    /// Create a new Ollama embedding backend
    pub fn new(model_name: String, host: Option<String>) -> anyhow::Result<Self> {
        let host = host
            .or_else(|| env::var("MTEB_OLLAMA_HOST").ok())
            .or_else(|| env::var("OLLAMA_HOST").ok())
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let host = host.trim_end_matches('/').to_string();

        // Known sizes for the tags most often benchmarked; 0 means detect on first call
        let dimensions = match model_name.split(':').next().unwrap_or(&model_name) {
            "nomic-embed-text" => 768,
            "mxbai-embed-large" => 1024,
            "all-minilm" => 384,
            "bge-m3" => 1024,
            "jina-embeddings-v3" => 1024,
            _ => 0,
        };

        info!("Ollama embedding backend: {} @ {}", model_name, host);

        Ok(Self {
            client: create_client(),
            host,
            model_name,
            dimensions,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Compute embeddings
    pub async fn embed(&self, texts: &[String], batch_size: usize) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(batch_size.max(1)) {
            let request = EmbedRequest {
                model: &self.model_name,
                input: batch,
                truncate: true,
            };

            let response = self
                .client
                .post(format!("{}/api/embed", self.host))
                .json(&request)
                .send()
                .await?;
            let response = check_response(response, "Ollama").await?;

            let embed_response: EmbedResponse = response.json().await?;
            debug!("Ollama returned {} embeddings", embed_response.embeddings.len());
            all_embeddings.extend(embed_response.embeddings);
        }

        Ok(all_embeddings)
    }
}
