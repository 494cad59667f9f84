//! OpenAI-compatible embedding backend (OpenAI, LM Studio, vLLM, ...)

use std::env;

use async_openai::{
    config::OpenAIConfig,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
    Client,
};
use tracing::info;

/// Hard request limit of the OpenAI embeddings endpoint
const MAX_INPUTS_PER_REQUEST: usize = 2048;

/// OpenAI embedding backend
pub struct OpenAIEmbedding {
    client: Client<OpenAIConfig>,
    model_name: String,
    dimensions: usize,
}

impl OpenAIEmbedding {
    /// Create a new OpenAI embedding backend
    ///
    /// A custom `base_url` (LM Studio and friends) does not require an API key.
    pub fn new(
        model_name: String,
        api_key: Option<String>,
        base_url: Option<String>,
    ) -> anyhow::Result<Self> {
        let base_url = base_url.or_else(|| env::var("OPENAI_BASE_URL").ok());
        let api_key = api_key.or_else(|| env::var("OPENAI_API_KEY").ok());

        let mut config = OpenAIConfig::new();
        match (api_key, &base_url) {
            (Some(key), _) => config = config.with_api_key(key),
            (None, Some(_)) => config = config.with_api_key("not-needed"),
            (None, None) => anyhow::bail!("OPENAI_API_KEY not set"),
        }
        if let Some(base_url) = base_url {
            config = config.with_api_base(base_url);
        }

        let dimensions = match model_name.as_str() {
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            "text-embedding-ada-002" => 1536,
            _ => 0,
        };

        info!("OpenAI embedding backend: {}", model_name);

        Ok(Self {
            client: Client::with_config(config),
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

        let batch_size = batch_size.clamp(1, MAX_INPUTS_PER_REQUEST);
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(batch_size) {
            let request = CreateEmbeddingRequestArgs::default()
                .model(&self.model_name)
                .input(EmbeddingInput::StringArray(batch.to_vec()))
                .build()?;

            let response = self.client.embeddings().create(request).await?;

            // The API does not promise response order; `index` does
            let mut data = response.data;
            data.sort_by_key(|d| d.index);
            all_embeddings.extend(data.into_iter().map(|d| d.embedding));
        }

        Ok(all_embeddings)
    }
}
