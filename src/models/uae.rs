//! UAE-Large-V1 (AnglE): prompt names select `{text}` templates

use std::sync::Arc;

use async_trait::async_trait;

use crate::embedding::{Backend, EmbedHint};
use crate::encoder::{EncodeOptions, Encoder, PromptMap};

/// Default prompt table from the AnglE model card
pub fn default_prompts() -> PromptMap {
    [
        ("query", "Represent this sentence for searching relevant passages: {text}"),
        ("Summarization", "Summarize sentence \"{text}\" in one word:\""),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Substitute every `{text}` placeholder
pub fn render(template: &str, text: &str) -> String {
    template.replace("{text}", text)
}

pub struct UaeWrapper {
    name: String,
    prompts: PromptMap,
    backend: Arc<dyn Backend>,
}

impl UaeWrapper {
    pub fn new(name: impl Into<String>, prompts: PromptMap, backend: Arc<dyn Backend>) -> Self {
        Self {
            name: name.into(),
            prompts,
            backend,
        }
    }
}

#[async_trait]
impl Encoder for UaeWrapper {
    fn name(&self) -> &str {
        &self.name
    }

    fn prompts(&self) -> Option<&PromptMap> {
        Some(&self.prompts)
    }

    async fn encode(&self, sentences: &[String], options: &EncodeOptions) -> anyhow::Result<Vec<Vec<f32>>> {
        let template = options
            .prompt_name
            .as_deref()
            .and_then(|name| self.prompts.get(name));

        let rendered;
        let texts = match template {
            Some(template) => {
                rendered = sentences.iter().map(|s| render(template, s)).collect::<Vec<_>>();
                rendered.as_slice()
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
