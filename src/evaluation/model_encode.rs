//! Prompt resolution and encoding dispatch
//!
//! Every evaluator goes through [`model_encode`] instead of calling
//! `Encoder::encode` directly, so that the prompt a model receives is chosen
//! the same way for every task.

use tracing::info;

use crate::encoder::{EncodeOptions, Encoder, PromptMap, PromptType};
use crate::error::MtebError;

/// Row-major embedding matrix, one row per input sentence
pub type Embeddings = Vec<Vec<f32>>;

/// Pick the prompt name for a task from the model's prompt table.
///
/// Precedence, first key present wins:
/// 1. `"{task_name}-{prompt_type}"`
/// 2. `task_name`
/// 3. `"{task_type}-{prompt_type}"`
/// 4. `task_type`
/// 5. `prompt_type`
///
/// A model without a prompt table gets the task name as its prompt name.
pub fn resolve_prompt_name(
    prompts: Option<&PromptMap>,
    task_name: Option<&str>,
    task_type: Option<&str>,
    prompt_type: Option<PromptType>,
) -> Option<String> {
    let task_name = task_name.filter(|s| !s.is_empty());
    let task_type = task_type.filter(|s| !s.is_empty());

    let Some(prompts) = prompts else {
        return task_name.map(str::to_string);
    };

    if prompts.is_empty() {
        info!("Model does not support prompts. Removing prompt_name argument.");
        return None;
    }

    let composed = |prefix: Option<&str>| -> Option<String> {
        Some(format!("{}-{}", prefix?, prompt_type?))
    };

    let candidates = [
        composed(task_name),
        task_name.map(str::to_string),
        composed(task_type),
        task_type.map(str::to_string),
        prompt_type.map(|p| p.as_str().to_string()),
    ];

    let resolved = candidates
        .into_iter()
        .flatten()
        .find(|key| prompts.contains_key(key));

    if resolved.is_none() {
        info!(
            "No combination of task name and prompt type was found in model prompts. \
             Removing prompt_name argument."
        );
    }

    resolved
}

/// Encode sentences for a task, resolving the prompt first.
///
/// The result is checked to be a proper matrix: one row per sentence and a
/// single dimension across rows.
pub async fn model_encode(
    sentences: &[String],
    model: &dyn Encoder,
    task_name: Option<&str>,
    task_type: Option<&str>,
    prompt_type: Option<PromptType>,
    options: &EncodeOptions,
) -> anyhow::Result<Embeddings> {
    let prompt_name = resolve_prompt_name(model.prompts(), task_name, task_type, prompt_type);

    info!(
        "Using {:?} prompt name for task={:?} task_type={:?} prompt_type={:?}",
        prompt_name, task_name, task_type, prompt_type
    );
    info!("Encoding {} sentences.", sentences.len());

    if sentences.is_empty() {
        return Ok(Vec::new());
    }

    let options = EncodeOptions {
        prompt_name,
        prompt_type,
        ..options.clone()
    };

    let embeddings = model.encode(sentences, &options).await?;
    check_shape(sentences.len(), &embeddings)?;

    Ok(embeddings)
}

fn check_shape(expected: usize, embeddings: &Embeddings) -> Result<(), MtebError> {
    if embeddings.len() != expected {
        return Err(MtebError::EmbeddingCount {
            expected,
            got: embeddings.len(),
        });
    }

    let dims = embeddings.first().map(Vec::len).unwrap_or(0);
    if let Some((index, row)) = embeddings.iter().enumerate().find(|(_, r)| r.len() != dims) {
        return Err(MtebError::EmbeddingShape {
            index,
            expected: dims,
            got: row.len(),
        });
    }

    Ok(())
}
