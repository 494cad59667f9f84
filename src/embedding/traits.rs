//! Embedding backend trait

use async_trait::async_trait;

use crate::encoder::PromptType;

/// Task conditioning a backend may use when it supports it natively
///
/// Backends without task-specific modes ignore the hint; prompt prefixes are
/// applied by the model wrappers before the texts reach the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedHint {
    /// Model-specific task identifier (e.g. `retrieval.query`)
    pub task: Option<String>,
    /// Query/passage side of the input
    pub input_type: Option<PromptType>,
}

/// Something that turns texts into vectors
#[async_trait]
pub trait Backend: Send + Sync {
    /// Get embedding dimensions (0 when not yet known)
    fn dimensions(&self) -> usize;

    /// Compute embeddings for texts, sending at most `batch_size` per request
    async fn embed(
        &self,
        texts: &[String],
        hint: &EmbedHint,
        batch_size: usize,
    ) -> anyhow::Result<Vec<Vec<f32>>>;
}
