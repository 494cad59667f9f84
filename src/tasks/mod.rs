//! Tasks - benchmark definitions, their data, and the task registry

mod local;
mod metadata;
mod retrieval;
mod xmarket;

pub use local::LocalTask;
pub use metadata::{EvalLangs, TaskMetadata, TaskType, DEFAULT_SUBSET};
pub use retrieval::RetrievalSplit;
pub use xmarket::XMarket;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::datasets::DatasetSource;
use crate::encoder::{EncodeOptions, Encoder};
use crate::error::MtebError;
use crate::evaluation::Scores;

/// Knobs shared by all evaluators
#[derive(Debug, Clone)]
pub struct EvalOptions {
    pub encode: EncodeOptions,
    /// Subsets to evaluate; `None` evaluates all
    pub subsets: Option<Vec<String>>,
    pub k_values: Vec<usize>,
    pub ignore_identical_ids: bool,
    pub corpus_chunk_size: usize,
    pub seed: u64,
    pub n_experiments: usize,
    pub samples_per_label: Option<usize>,
    pub knn_k: usize,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            encode: EncodeOptions::default(),
            subsets: None,
            k_values: crate::evaluation::retrieval::DEFAULT_K_VALUES.to_vec(),
            ignore_identical_ids: false,
            corpus_chunk_size: 50_000,
            seed: 42,
            n_experiments: 10,
            samples_per_label: Some(8),
            knn_k: 5,
        }
    }
}

impl EvalOptions {
    pub fn wants_subset(&self, subset: &str) -> bool {
        self.subsets
            .as_ref()
            .map_or(true, |wanted| wanted.iter().any(|s| s == subset))
    }
}

/// Scores for one dataset subset of one split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsetScores {
    pub hf_subset: String,
    pub languages: Vec<String>,
    pub scores: Scores,
}

/// A benchmark task
#[async_trait]
pub trait Task: Send + Sync {
    fn metadata(&self) -> &TaskMetadata;

    fn data_loaded(&self) -> bool;

    /// Load the task's data; calling it again once loaded does nothing
    async fn load_data(&mut self, source: &DatasetSource) -> anyhow::Result<()>;

    /// Evaluate every selected subset of `split`
    async fn evaluate(
        &self,
        model: &dyn Encoder,
        split: &str,
        options: &EvalOptions,
    ) -> anyhow::Result<Vec<SubsetScores>>;
}

/// Tasks shipped with the binary
pub fn builtin_tasks() -> Vec<Box<dyn Task>> {
    vec![Box::new(XMarket::new())]
}

/// Select tasks by name, type and language from the built-in tasks plus
/// any locally defined ones.
///
/// Empty filters match everything; an unknown name is an error.
pub fn get_tasks(
    names: &[String],
    task_types: &[TaskType],
    languages: &[String],
    local: Vec<Box<dyn Task>>,
) -> Result<Vec<Box<dyn Task>>, MtebError> {
    let mut all = builtin_tasks();
    all.extend(local);

    if let Some(unknown) = names
        .iter()
        .find(|n| !all.iter().any(|t| &t.metadata().name == *n))
    {
        return Err(MtebError::UnknownTask(unknown.clone()));
    }

    Ok(all
        .into_iter()
        .filter(|t| names.is_empty() || names.contains(&t.metadata().name))
        .filter(|t| task_types.is_empty() || task_types.contains(&t.metadata().task_type))
        .filter(|t| languages.is_empty() || !t.metadata().subsets_for_languages(languages).is_empty())
        .collect())
}
