//! Typed errors for lookups and data validation

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MtebError {
    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("task '{task}' has no data loaded for split '{split}'")]
    MissingSplit { task: String, split: String },

    #[error("invalid dataset row in {source_name}: {reason}")]
    InvalidRow { source_name: String, reason: String },

    #[error("model returned {got} embeddings for {expected} sentences")]
    EmbeddingCount { expected: usize, got: usize },

    #[error("embedding {index} has {got} dimensions, expected {expected}")]
    EmbeddingShape {
        index: usize,
        expected: usize,
        got: usize,
    },
}
