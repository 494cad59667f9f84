//! Generic wrappers: prompt-prefix models and prompt-less passthrough

use std::sync::Arc;

use async_trait::async_trait;

use crate::embedding::{Backend, EmbedHint};
use crate::encoder::{EncodeOptions, Encoder, PromptMap};

/// Prepends the prompt value to every sentence, as sentence-transformers does
pub struct SentenceTransformerWrapper {
    name: String,
    prompts: PromptMap,
    backend: Arc<dyn Backend>,
}

impl SentenceTransformerWrapper {
    pub fn new(name: impl Into<String>, prompts: PromptMap, backend: Arc<dyn Backend>) -> Self {
        Self {
            name: name.into(),
            prompts,
            backend,
        }
    }
}

#[async_trait]
impl Encoder for SentenceTransformerWrapper {
    fn name(&self) -> &str {
        &self.name
    }

    fn prompts(&self) -> Option<&PromptMap> {
        Some(&self.prompts)
    }

    async fn encode(&self, sentences: &[String], options: &EncodeOptions) -> anyhow::Result<Vec<Vec<f32>>> {
        let prefix = options
            .prompt_name
            .as_deref()
            .and_then(|name| self.prompts.get(name))
            .filter(|p| !p.is_empty());

        let prefixed;
        let texts = match prefix {
            Some(prefix) => {
                prefixed = sentences
                    .iter()
                    .map(|s| format!("{}{}", prefix, s))
                    .collect::<Vec<_>>();
                prefixed.as_slice()
            }
            None => sentences,
        };

        let hint = EmbedHint {
            task: None,
            input_type: options.prompt_type,
        };
        self.backend.embed(texts, &hint, options.batch_size).await
    }
}

/// A model with no prompt table; the resolved prompt name (the task name)
/// is forwarded to the backend as a hint only
pub struct PassthroughEncoder {
    name: String,
    backend: Arc<dyn Backend>,
}

impl PassthroughEncoder {
    pub fn new(name: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }
}

#[async_trait]
impl Encoder for PassthroughEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn prompts(&self) -> Option<&PromptMap> {
        None
    }

    async fn encode(&self, sentences: &[String], options: &EncodeOptions) -> anyhow::Result<Vec<Vec<f32>>> {
        let hint = EmbedHint {
            task: options.prompt_name.clone(),
            input_type: options.prompt_type,
        };
        self.backend.embed(sentences, &hint, options.batch_size).await
    }
}
