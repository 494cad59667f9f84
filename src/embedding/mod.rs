//! Embedding backends - the engines behind the benchmarked models

mod gemini;
mod ollama;
mod openai;
mod traits;
mod truncate;

#[cfg(feature = "local-embeddings")]
mod candle;

pub use traits::{Backend, EmbedHint};

use async_trait::async_trait;
use tracing::{debug, info};

/// Backend selection
#[derive(Debug, Clone)]
pub enum EmbeddingMode {
    OpenAI {
        api_key: Option<String>,
        base_url: Option<String>,
    },
    Ollama {
        host: Option<String>,
    },
    Gemini {
        api_key: Option<String>,
    },
    #[cfg(feature = "local-embeddings")]
    Local {
        revision: Option<String>,
        model_path: Option<String>,
    },
}

impl EmbeddingMode {
    pub fn name(&self) -> &'static str {
        match self {
            EmbeddingMode::OpenAI { .. } => "openai",
            EmbeddingMode::Ollama { .. } => "ollama",
            EmbeddingMode::Gemini { .. } => "gemini",
            #[cfg(feature = "local-embeddings")]
            EmbeddingMode::Local { .. } => "local",
        }
    }

    /// Remote APIs reject oversized inputs; local models truncate themselves
    fn truncates_client_side(&self) -> bool {
        !matches!(self.name(), "local")
    }
}

/// Unified embedding backend
pub struct EmbeddingProvider {
    model_name: String,
    token_limit: Option<usize>,
    inner: EmbeddingProviderInner,
}

enum EmbeddingProviderInner {
    OpenAI(openai::OpenAIEmbedding),
    Ollama(ollama::OllamaEmbedding),
    Gemini(gemini::GeminiEmbedding),
    #[cfg(feature = "local-embeddings")]
    Local(candle::CandleEmbedding),
}

impl EmbeddingProvider {
    /// Create a new embedding backend serving `model_name`
    pub fn new(model_name: String, mode: EmbeddingMode) -> anyhow::Result<Self> {
        let token_limit = if mode.truncates_client_side() {
            truncate::get_token_limit(&model_name)
        } else {
            None
        };

        let inner = match mode {
            EmbeddingMode::OpenAI { api_key, base_url } => EmbeddingProviderInner::OpenAI(
                openai::OpenAIEmbedding::new(model_name.clone(), api_key, base_url)?,
            ),
            EmbeddingMode::Ollama { host } => {
                EmbeddingProviderInner::Ollama(ollama::OllamaEmbedding::new(model_name.clone(), host)?)
            }
            EmbeddingMode::Gemini { api_key } => EmbeddingProviderInner::Gemini(
                gemini::GeminiEmbedding::new(model_name.clone(), api_key)?,
            ),
            #[cfg(feature = "local-embeddings")]
            EmbeddingMode::Local {
                revision,
                model_path,
            } => EmbeddingProviderInner::Local(candle::CandleEmbedding::new(
                model_name.clone(),
                revision,
                model_path,
            )?),
        };

        info!(
            "Initialized embedding backend: {} (token limit: {})",
            model_name,
            token_limit.map_or("none".to_string(), |l| l.to_string())
        );

        Ok(Self {
            model_name,
            token_limit,
            inner,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[async_trait]
impl Backend for EmbeddingProvider {
    fn dimensions(&self) -> usize {
        match &self.inner {
            EmbeddingProviderInner::OpenAI(p) => p.dimensions(),
            EmbeddingProviderInner::Ollama(p) => p.dimensions(),
            EmbeddingProviderInner::Gemini(p) => p.dimensions(),
            #[cfg(feature = "local-embeddings")]
            EmbeddingProviderInner::Local(p) => p.dimensions(),
        }
    }

    async fn embed(
        &self,
        texts: &[String],
        hint: &EmbedHint,
        batch_size: usize,
    ) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let owned;
        let texts = match self.token_limit {
            Some(limit) => {
                owned = truncate::truncate_to_token_limit(texts, limit)?
                    .into_iter()
                    .map(|t| t.into_owned())
                    .collect::<Vec<_>>();
                owned.as_slice()
            }
            None => texts,
        };

        debug!("{}: embedding {} texts ({:?})", self.model_name, texts.len(), hint);

        match &self.inner {
            EmbeddingProviderInner::OpenAI(p) => p.embed(texts, batch_size).await,
            EmbeddingProviderInner::Ollama(p) => p.embed(texts, batch_size).await,
            EmbeddingProviderInner::Gemini(p) => p.embed(texts, hint, batch_size).await,
            #[cfg(feature = "local-embeddings")]
            EmbeddingProviderInner::Local(p) => p.embed(texts, batch_size),
        }
    }
}
