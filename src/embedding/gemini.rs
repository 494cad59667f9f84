//! Google Gemini embedding backend

use std::env;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::traits::EmbedHint;
use crate::encoder::PromptType;
use crate::http::{check_response, create_client};

/// Gemini batch limit
const MAX_BATCH: usize = 100;

/// Gemini embedding backend
pub struct GeminiEmbedding {
    client: Client,
    model_name: String,
    api_key: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: String,
    content: Content<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_type: Option<&'static str>,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Deserialize)]
struct Embedding {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Embedding>,
}

/// Map a task hint onto Gemini's `taskType`
///
/// An explicit task wins over the query/passage side.
pub(crate) fn task_type_for(hint: &EmbedHint) -> Option<&'static str> {
    let from_task = hint.task.as_deref().and_then(|task| match task {
        "retrieval.query" => Some("RETRIEVAL_QUERY"),
        "retrieval.passage" => Some("RETRIEVAL_DOCUMENT"),
        "classification" => Some("CLASSIFICATION"),
        "separation" => Some("CLUSTERING"),
        "text-matching" => Some("SEMANTIC_SIMILARITY"),
        _ => None,
    });

    from_task.or(match hint.input_type {
        Some(PromptType::Query) => Some("RETRIEVAL_QUERY"),
        Some(PromptType::Passage) => Some("RETRIEVAL_DOCUMENT"),
        None => None,
    })
}

impl GeminiEmbedding {
    /// Create a new Gemini embedding backend
    pub fn new(model_name: String, api_key: Option<String>) -> anyhow::Result<Self> {
        let api_key = api_key
            .or_else(|| env::var("GOOGLE_API_KEY").ok())
            .or_else(|| env::var("GEMINI_API_KEY").ok())
            .ok_or_else(|| anyhow::anyhow!("GOOGLE_API_KEY or GEMINI_API_KEY not set"))?;

        let dimensions = match model_name.as_str() {
            "text-embedding-004" | "embedding-001" => 768,
            "gemini-embedding-001" => 3072,
            _ => 0,
        };

        info!("Gemini embedding backend: {}", model_name);

        Ok(Self {
            client: create_client(),
            model_name,
            api_key,
            dimensions,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Compute embeddings
    pub async fn embed(
        &self,
        texts: &[String],
        hint: &EmbedHint,
        batch_size: usize,
    ) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:batchEmbedContents",
            self.model_name
        );
        let task_type = task_type_for(hint);
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(batch_size.clamp(1, MAX_BATCH)) {
            let requests = batch
                .iter()
                .map(|text| EmbedRequest {
                    model: format!("models/{}", self.model_name),
                    content: Content {
                        parts: [Part { text }],
                    },
                    task_type,
                })
                .collect();

            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&BatchEmbedRequest { requests })
                .send()
                .await?;
            let response = check_response(response, "Gemini").await?;

            let parsed: BatchEmbedResponse = response.json().await?;
            all_embeddings.extend(parsed.embeddings.into_iter().map(|e| e.values));
        }

        Ok(all_embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_hint_wins_over_input_type() {
        let hint = EmbedHint {
            task: Some("separation".to_string()),
            input_type: Some(PromptType::Query),
        };
        assert_eq!(task_type_for(&hint), Some("CLUSTERING"));
    }

    #[test]
    fn test_input_type_fallback() {
        let hint = EmbedHint {
            task: Some("unknown".to_string()),
            input_type: Some(PromptType::Passage),
        };
        assert_eq!(task_type_for(&hint), Some("RETRIEVAL_DOCUMENT"));
        assert_eq!(task_type_for(&EmbedHint::default()), None);
    }
}
