//! The uniform encode contract every benchmarked model implements

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Prompt table of a model: prompt name -> value.
///
/// What the value means is up to the wrapper: an instruction prefix, a task
/// identifier forwarded to the backend, or a `{text}` template.
pub type PromptMap = BTreeMap<String, String>;

/// Which side of an asymmetric task is being encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptType {
    Query,
    Passage,
}

impl PromptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptType::Query => "query",
            PromptType::Passage => "passage",
        }
    }
}

impl fmt::Display for PromptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options passed through to `Encoder::encode`
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// Resolved key into the model's prompt table
    pub prompt_name: Option<String>,
    /// Sentences per backend request
    pub batch_size: usize,
    /// Query/passage side, for backends that condition on it
    pub prompt_type: Option<PromptType>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            prompt_name: None,
            batch_size: 32,
            prompt_type: None,
        }
    }
}

impl EncodeOptions {
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            ..Self::default()
        }
    }
}

/// A model under evaluation
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Model name as registered (e.g. `jinaai/jina-embeddings-v3`)
    fn name(&self) -> &str;

    /// The model's prompt table.
    ///
    /// `None` means the model has no notion of a prompt table; `Some` with an
    /// empty map means it has one but supports no prompts.
    fn prompts(&self) -> Option<&PromptMap>;

    /// Encode sentences into one vector each
    async fn encode(
        &self,
        sentences: &[String],
        options: &EncodeOptions,
    ) -> anyhow::Result<Vec<Vec<f32>>>;
}
