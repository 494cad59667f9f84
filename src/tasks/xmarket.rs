//! XMarket: cross-market product retrieval in German, English and Spanish

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::info;

use super::retrieval::{evaluate_retrieval, load_multilingual_retrieval, RetrievalData};
use super::{EvalLangs, EvalOptions, SubsetScores, Task, TaskMetadata, TaskType};
use crate::datasets::{DatasetRef, DatasetSource};
use crate::encoder::Encoder;
use crate::error::MtebError;

const DATASET_PATH: &str = "jinaai/xmarket_ml";
const DATASET_REVISION: &str = "dfe57acff5b62c23732a7b7d3e3fb84ff501708b";

const CITATION: &str = r#"@inproceedings{Bonab_2021,
  series={CIKM '21},
  title={Cross-Market Product Recommendation},
  url={http://dx.doi.org/10.1145/3459637.3482493},
  DOI={10.1145/3459637.3482493},
  booktitle={Proceedings of the 30th ACM International Conference on Information & Knowledge Management},
  publisher={ACM},
  author={Bonab, Hamed and Aliannejadi, Mohammad and Vardasbi, Ali and Kanoulas, Evangelos and Allan, James},
  year={2021},
  month=oct,
  collection={CIKM '21}
}"#;

fn metadata() -> TaskMetadata {
    let langs: BTreeMap<String, Vec<String>> = [("de", "deu-Latn"), ("en", "eng-Latn"), ("es", "spa-Latn")]
        .into_iter()
        .map(|(subset, lang)| (subset.to_string(), vec![lang.to_string()]))
        .collect();

    TaskMetadata {
        name: "XMarket".to_string(),
        description: "XMarket".to_string(),
        reference: None,
        dataset: DatasetRef::new(DATASET_PATH, DATASET_REVISION),
        task_type: TaskType::Retrieval,
        category: Some("s2p".to_string()),
        modalities: vec!["text".to_string()],
        eval_splits: vec!["test".to_string()],
        eval_langs: EvalLangs::Multilingual(langs),
        main_score: "ndcg_at_10".to_string(),
        bibtex_citation: Some(CITATION.to_string()),
    }
}

pub struct XMarket {
    metadata: TaskMetadata,
    data: Option<RetrievalData>,
}

impl XMarket {
    pub fn new() -> Self {
        Self {
            metadata: metadata(),
            data: None,
        }
    }
}

impl Default for XMarket {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Task for XMarket {
    fn metadata(&self) -> &TaskMetadata {
        &self.metadata
    }

    fn data_loaded(&self) -> bool {
        self.data.is_some()
    }

    async fn load_data(&mut self, source: &DatasetSource) -> anyhow::Result<()> {
        if self.data.is_some() {
            return Ok(());
        }

        let langs: Vec<String> = self.metadata.eval_langs.subsets().into_iter().map(|(s, _)| s).collect();
        let mut data = RetrievalData::new();
        for split in &self.metadata.eval_splits {
            let loaded = load_multilingual_retrieval(source, &self.metadata.dataset, &langs, split).await?;
            for (lang, splits) in loaded {
                data.entry(lang).or_default().extend(splits);
            }
        }

        info!("Loaded {} ({} languages)", self.metadata.name, data.len());
        self.data = Some(data);
        Ok(())
    }

    async fn evaluate(
        &self,
        model: &dyn Encoder,
        split: &str,
        options: &EvalOptions,
    ) -> anyhow::Result<Vec<SubsetScores>> {
        let data = self.data.as_ref().ok_or_else(|| MtebError::MissingSplit {
            task: self.metadata.name.clone(),
            split: split.to_string(),
        })?;
        evaluate_retrieval(&self.metadata, data, model, split, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{EncodeOptions, PromptMap};

    /// Embeds by counting a few fixed words
    struct BagOfWords;

    #[async_trait]
    impl Encoder for BagOfWords {
        fn name(&self) -> &str {
            "bag"
        }

        fn prompts(&self) -> Option<&PromptMap> {
            None
        }

        async fn encode(&self, sentences: &[String], _options: &EncodeOptions) -> anyhow::Result<Vec<Vec<f32>>> {
            let vocab = ["shoe", "lamp", "book"];
            Ok(sentences
                .iter()
                .map(|s| {
                    let lower = s.to_lowercase();
                    let mut v: Vec<f32> = vocab.iter().map(|w| lower.matches(w).count() as f32).collect();
                    v.push(0.01);
                    v
                })
                .collect())
        }
    }

    fn write_fixture(root: &std::path::Path) {
        let base = root.join(DATASET_PATH);
        for lang in ["de", "en", "es"] {
            let files = [
                (
                    format!("corpus-{}", lang),
                    "{\"_id\":\"d1\",\"title\":\"\",\"text\":\"red shoe\"}\n{\"_id\":\"d2\",\"text\":\"desk lamp\"}\n",
                ),
                (
                    format!("queries-{}", lang),
                    "{\"_id\":\"q1\",\"text\":\"shoe\"}\n{\"_id\":\"q2\",\"text\":\"lamp\"}\n",
                ),
                (
                    format!("qrels-{}", lang),
                    "{\"_id\":\"q1\",\"text\":\"d1\"}\n{\"_id\":\"q2\",\"text\":\"d2\"}\n",
                ),
            ];
            for (config, body) in files {
                std::fs::create_dir_all(base.join(&config)).unwrap();
                std::fs::write(base.join(&config).join("test.jsonl"), body).unwrap();
            }
        }
    }

    #[test]
    fn test_metadata() {
        let task = XMarket::new();
        let meta = task.metadata();
        assert_eq!(meta.dataset.revision, DATASET_REVISION);
        assert_eq!(meta.category.as_deref(), Some("s2p"));
        assert_eq!(meta.eval_langs.languages(), vec!["deu-Latn", "eng-Latn", "spa-Latn"]);
        assert!(!task.data_loaded());
    }

    #[tokio::test]
    async fn test_load_and_evaluate_from_mirror() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let source = DatasetSource::new(dir.path().join("cache"), Some(dir.path().to_path_buf()));

        let mut task = XMarket::new();
        task.load_data(&source).await.unwrap();
        assert!(task.data_loaded());
        // Second call is a no-op
        task.load_data(&source).await.unwrap();

        let options = EvalOptions {
            subsets: Some(vec!["en".to_string()]),
            ..EvalOptions::default()
        };
        let scores = task.evaluate(&BagOfWords, "test", &options).await.unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].hf_subset, "en");
        assert_eq!(scores[0].languages, vec!["eng-Latn"]);
        assert_eq!(scores[0].scores["ndcg_at_10"], 1.0);
    }

    #[tokio::test]
    async fn test_evaluate_before_load_fails() {
        let task = XMarket::new();
        let err = task
            .evaluate(&BagOfWords, "test", &EvalOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("XMarket"));
    }
}
