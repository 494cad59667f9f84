//! jina-embeddings-v3: prompt names route to task adapters

use std::sync::Arc;

use async_trait::async_trait;

use crate::embedding::{Backend, EmbedHint};
use crate::encoder::{EncodeOptions, Encoder, PromptMap};

/// Instruction prepended for each jina task; tasks not listed get none
const TASK_INSTRUCTIONS: [(&str, &str); 5] = [
    ("retrieval.query", "Represent the query for retrieving evidence documents: "),
    ("retrieval.passage", "Represent the document for retrieval: "),
    ("separation", ""),
    ("classification", ""),
    ("text-matching", ""),
];

/// Default prompt table: benchmark prompt name -> jina task
pub fn default_prompts() -> PromptMap {
    [
        ("Retrieval-query", "retrieval.query"),
        ("Retrieval-passage", "retrieval.passage"),
        ("Clustering", "separation"),
        ("Classification", "classification"),
        ("STS", "text-matching"),
        ("PairClassification", "text-matching"),
        ("BitextMining", "text-matching"),
        ("MultilabelClassification", "classification"),
        ("Reranking", "separation"),
        ("Summarization", "text-matching"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn instruction_for(task: &str) -> &'static str {
    TASK_INSTRUCTIONS
        .iter()
        .find(|(name, _)| *name == task)
        .map(|(_, instruction)| *instruction)
        .unwrap_or("")
}

/// Two-level indirection: prompt name -> jina task -> instruction
pub struct JinaWrapper {
    name: String,
    prompts: PromptMap,
    backend: Arc<dyn Backend>,
}

impl JinaWrapper {
    pub fn new(name: impl Into<String>, prompts: PromptMap, backend: Arc<dyn Backend>) -> Self {
        Self {
            name: name.into(),
            prompts,
            backend,
        }
    }

    /// The jina task selected by a prompt name, empty when unmapped
    pub fn task_for(&self, prompt_name: Option<&str>) -> &str {
        prompt_name
            .and_then(|p| self.prompts.get(p))
            .map(String::as_str)
            .unwrap_or("")
    }
}

#[async_trait]
impl Encoder for JinaWrapper {
    fn name(&self) -> &str {
        &self.name
    }

    fn prompts(&self) -> Option<&PromptMap> {
        Some(&self.prompts)
    }

    async fn encode(&self, sentences: &[String], options: &EncodeOptions) -> anyhow::Result<Vec<Vec<f32>>> {
        let task = self.task_for(options.prompt_name.as_deref());
        let instruction = instruction_for(task);

        let texts: Vec<String> = sentences
            .iter()
            .map(|s| format!("{}{}", instruction, s))
            .collect();

        let hint = EmbedHint {
            task: (!task.is_empty()).then(|| task.to_string()),
            input_type: options.prompt_type,
        };

        self.backend.embed(&texts, &hint, options.batch_size).await
    }
}
