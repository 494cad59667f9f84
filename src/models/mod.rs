//! Model registry - metadata and wrapper selection for known models

mod jina;
mod sentence_transformer;
mod uae;

pub use jina::JinaWrapper;
pub use sentence_transformer::{PassthroughEncoder, SentenceTransformerWrapper};
pub use uae::UaeWrapper;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::embedding::Backend;
use crate::encoder::{Encoder, PromptMap};

/// Placeholder revision used in result paths when a model is not pinned
pub const NO_REVISION: &str = "no_revision_available";

/// Which wrapper adapts the backend to the benchmark's encode contract
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "wrapper", rename_all = "snake_case")]
pub enum ModelLoader {
    Jina { prompts: PromptMap },
    Uae { prompts: PromptMap },
    SentenceTransformer { prompts: PromptMap },
    Passthrough,
}

/// Descriptive metadata for a benchmarked model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMeta {
    pub name: String,
    pub revision: Option<String>,
    pub languages: Vec<String>,
    pub open_source: Option<bool>,
    pub release_date: Option<String>,
    pub loader: ModelLoader,
}

impl ModelMeta {
    /// Metadata for a model the registry does not know
    pub fn unregistered(name: impl Into<String>, revision: Option<String>) -> Self {
        Self {
            name: name.into(),
            revision,
            languages: Vec::new(),
            open_source: None,
            release_date: None,
            loader: ModelLoader::Passthrough,
        }
    }

    /// Wrap a backend according to this model's loader
    pub fn load(&self, backend: Arc<dyn Backend>) -> Box<dyn Encoder> {
        let name = self.name.clone();
        match &self.loader {
            ModelLoader::Jina { prompts } => Box::new(JinaWrapper::new(name, prompts.clone(), backend)),
            ModelLoader::Uae { prompts } => Box::new(UaeWrapper::new(name, prompts.clone(), backend)),
            ModelLoader::SentenceTransformer { prompts } => {
                Box::new(SentenceTransformerWrapper::new(name, prompts.clone(), backend))
            }
            ModelLoader::Passthrough => Box::new(PassthroughEncoder::new(name, backend)),
        }
    }

    /// Directory name for results: `org/model` becomes `org__model`
    pub fn model_dir_name(&self) -> String {
        self.name.replace('/', "__")
    }

    pub fn revision_dir_name(&self) -> &str {
        self.revision.as_deref().unwrap_or(NO_REVISION)
    }

    pub fn wrapper_name(&self) -> &'static str {
        match self.loader {
            ModelLoader::Jina { .. } => "jina",
            ModelLoader::Uae { .. } => "uae",
            ModelLoader::SentenceTransformer { .. } => "sentence-transformer",
            ModelLoader::Passthrough => "passthrough",
        }
    }
}

fn prompt_map(pairs: &[(&str, &str)]) -> PromptMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn langs(codes: &[&str]) -> Vec<String> {
    codes.iter().map(|c| c.to_string()).collect()
}

/// All registered models
pub fn list_models() -> Vec<ModelMeta> {
    vec![
        ModelMeta {
            name: "jinaai/jina-embeddings-v3".to_string(),
            revision: Some("343dbf534c76fe845f304fa5c2d1fd87e1e78918".to_string()),
            languages: langs(&["eng_Latn"]),
            open_source: Some(true),
            release_date: Some("2024-09-05".to_string()),
            loader: ModelLoader::Jina {
                prompts: jina::default_prompts(),
            },
        },
        ModelMeta {
            name: "WhereIsAI/UAE-Large-V1".to_string(),
            revision: Some("369c368f70f16a613f19f5598d4f12d9f44235d4".to_string()),
            languages: langs(&["eng_Latn"]),
            open_source: Some(true),
            release_date: Some("2023-12-04".to_string()),
            loader: ModelLoader::Uae {
                prompts: uae::default_prompts(),
            },
        },
        ModelMeta {
            name: "intfloat/multilingual-e5-small".to_string(),
            revision: None,
            languages: langs(&["eng_Latn", "deu_Latn", "spa_Latn"]),
            open_source: Some(true),
            release_date: Some("2023-06-30".to_string()),
            loader: ModelLoader::SentenceTransformer {
                prompts: prompt_map(&[("query", "query: "), ("passage", "passage: ")]),
            },
        },
        ModelMeta {
            name: "BAAI/bge-small-en-v1.5".to_string(),
            revision: None,
            languages: langs(&["eng_Latn"]),
            open_source: Some(true),
            release_date: Some("2023-09-12".to_string()),
            loader: ModelLoader::SentenceTransformer {
                prompts: prompt_map(&[(
                    "query",
                    "Represent this sentence for searching relevant passages: ",
                )]),
            },
        },
        ModelMeta {
            name: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            revision: None,
            languages: langs(&["eng_Latn"]),
            open_source: Some(true),
            release_date: Some("2021-08-30".to_string()),
            loader: ModelLoader::SentenceTransformer {
                prompts: PromptMap::new(),
            },
        },
    ]
}

/// Registered metadata for `name`, if any
pub fn get_model_meta(name: &str) -> Option<ModelMeta> {
    list_models().into_iter().find(|m| m.name == name)
}

/// Registered metadata, or passthrough metadata for unknown names
pub fn resolve_model_meta(name: &str, revision: Option<String>) -> ModelMeta {
    match get_model_meta(name) {
        Some(mut meta) => {
            if revision.is_some() {
                meta.revision = revision;
            }
            meta
        }
        None => {
            tracing::info!("Model '{}' is not registered; using it without prompts", name);
            ModelMeta::unregistered(name, revision)
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Backend double that records what it was asked to embed

    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::embedding::{Backend, EmbedHint};

    #[derive(Default)]
    pub struct EchoBackend {
        calls: Mutex<Vec<(Vec<String>, EmbedHint)>>,
    }

    impl EchoBackend {
        pub fn last_call(&self) -> (Vec<String>, EmbedHint) {
            self.calls.lock().unwrap().last().cloned().expect("backend was not called")
        }
    }

    #[async_trait]
    impl Backend for EchoBackend {
        fn dimensions(&self) -> usize {
            2
        }

        async fn embed(&self, texts: &[String], hint: &EmbedHint, _batch_size: usize) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.lock().unwrap().push((texts.to_vec(), hint.clone()));
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::model_encode::resolve_prompt_name;
    use crate::encoder::PromptType;

    #[test]
    fn test_registry_lookup() {
        let jina = get_model_meta("jinaai/jina-embeddings-v3").unwrap();
        assert_eq!(jina.wrapper_name(), "jina");
        assert_eq!(jina.model_dir_name(), "jinaai__jina-embeddings-v3");
        assert!(get_model_meta("nope/nope").is_none());
    }

    #[test]
    fn test_unregistered_model_has_no_prompt_table() {
        let meta = resolve_model_meta("my/custom", None);
        assert_eq!(meta.wrapper_name(), "passthrough");
        assert_eq!(meta.revision_dir_name(), NO_REVISION);

        let encoder = meta.load(Arc::new(testing::EchoBackend::default()));
        assert!(encoder.prompts().is_none());
    }

    #[test]
    fn test_revision_override() {
        let meta = resolve_model_meta("WhereIsAI/UAE-Large-V1", Some("abc".to_string()));
        assert_eq!(meta.revision_dir_name(), "abc");
    }

    #[test]
    fn test_jina_prompts_resolve_per_task_type() {
        let meta = get_model_meta("jinaai/jina-embeddings-v3").unwrap();
        let encoder = meta.load(Arc::new(testing::EchoBackend::default()));
        let prompts = encoder.prompts();

        let query = resolve_prompt_name(prompts, Some("XMarket"), Some("Retrieval"), Some(PromptType::Query));
        assert_eq!(query.as_deref(), Some("Retrieval-query"));
        let clustering = resolve_prompt_name(prompts, Some("Toy"), Some("Clustering"), None);
        assert_eq!(clustering.as_deref(), Some("Clustering"));
    }

    #[test]
    fn test_uae_passage_has_no_prompt() {
        let meta = get_model_meta("WhereIsAI/UAE-Large-V1").unwrap();
        let encoder = meta.load(Arc::new(testing::EchoBackend::default()));
        let prompts = encoder.prompts();

        assert_eq!(
            resolve_prompt_name(prompts, Some("XMarket"), Some("Retrieval"), Some(PromptType::Query)).as_deref(),
            Some("query")
        );
        assert_eq!(
            resolve_prompt_name(prompts, Some("XMarket"), Some("Retrieval"), Some(PromptType::Passage)),
            None
        );
    }
}
