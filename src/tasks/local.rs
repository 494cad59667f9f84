//! Tasks defined on disk by a `task.toml` next to JSONL data
//!
//! Layout for a monolingual task (multilingual tasks repeat it under one
//! directory per subset):
//!
//! ```text
//! my-task/
//!   task.toml
//!   corpus.jsonl  queries.jsonl  qrels/<split>.jsonl   # Retrieval
//!   <split>.jsonl                                       # Classification, Clustering
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use tracing::info;

use super::retrieval::{corpus_from_rows, queries_from_rows, CorpusRow, TextRow};
use super::{
    EvalLangs, EvalOptions, RetrievalSplit, SubsetScores, Task, TaskMetadata, TaskType, DEFAULT_SUBSET,
};
use crate::datasets::{read_jsonl, DatasetRef, DatasetSource};
use crate::encoder::Encoder;
use crate::error::MtebError;
use crate::evaluation::{
    ClassificationEvaluator, ClusteringEvaluator, ClusteringSet, LabeledText, Qrels, RetrievalEvaluator,
};

pub const TASK_FILE: &str = "task.toml";
const LOCAL_REVISION: &str = "local";

#[derive(Debug, Deserialize)]
struct TaskFile {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    reference: Option<String>,
    #[serde(rename = "type")]
    task_type: TaskType,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    main_score: Option<String>,
    #[serde(default = "default_eval_splits")]
    eval_splits: Vec<String>,
    eval_langs: EvalLangs,
    #[serde(default = "default_train_split")]
    train_split: String,
    #[serde(default)]
    revision: Option<String>,
    #[serde(default)]
    bibtex_citation: Option<String>,
}

fn default_eval_splits() -> Vec<String> {
    vec!["test".to_string()]
}

fn default_train_split() -> String {
    "train".to_string()
}

/// Ids and labels may be written as strings or numbers
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        other => Err(serde::de::Error::custom(format!("expected string or number, got {}", other))),
    }
}

fn strings_or_numbers<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    struct Wrapped(#[serde(deserialize_with = "string_or_number")] String);
    Ok(Vec::<Wrapped>::deserialize(deserializer)?
        .into_iter()
        .map(|w| w.0)
        .collect())
}

#[derive(Debug, Deserialize)]
struct QrelRow {
    #[serde(rename = "query-id", deserialize_with = "string_or_number")]
    query_id: String,
    #[serde(rename = "corpus-id", deserialize_with = "string_or_number")]
    corpus_id: String,
    #[serde(default = "default_grade")]
    score: i32,
}

fn default_grade() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
struct LabelRow {
    text: String,
    #[serde(deserialize_with = "string_or_number")]
    label: String,
}

#[derive(Debug, Deserialize)]
struct ClusteringRow {
    sentences: Vec<String>,
    #[serde(deserialize_with = "strings_or_numbers")]
    labels: Vec<String>,
}

#[derive(Debug, Clone)]
enum SplitData {
    Retrieval(RetrievalSplit),
    Classification {
        train: Vec<LabeledText>,
        test: Vec<LabeledText>,
    },
    Clustering(Vec<ClusteringSet>),
}

/// subset -> split -> data
type LocalData = BTreeMap<String, BTreeMap<String, SplitData>>;

/// A task read from a directory
pub struct LocalTask {
    metadata: TaskMetadata,
    root: PathBuf,
    train_split: String,
    data: Option<LocalData>,
}

impl LocalTask {
    /// Read `task.toml` from `dir`; data is loaded later by `load_data`
    pub fn from_dir(dir: &Path) -> anyhow::Result<Self> {
        let path = dir.join(TASK_FILE);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file: TaskFile =
            toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;

        if !matches!(
            file.task_type,
            TaskType::Retrieval | TaskType::Classification | TaskType::Clustering
        ) {
            anyhow::bail!(
                "{}: {} tasks cannot be evaluated (supported: Retrieval, Classification, Clustering)",
                file.name,
                file.task_type
            );
        }

        let main_score = file
            .main_score
            .unwrap_or_else(|| file.task_type.default_main_score().to_string());

        let metadata = TaskMetadata {
            name: file.name,
            description: file.description,
            reference: file.reference,
            dataset: DatasetRef::new(
                dir.display().to_string(),
                file.revision.unwrap_or_else(|| LOCAL_REVISION.to_string()),
            ),
            task_type: file.task_type,
            category: file.category,
            modalities: vec!["text".to_string()],
            eval_splits: file.eval_splits,
            eval_langs: file.eval_langs,
            main_score,
            bibtex_citation: file.bibtex_citation,
        };

        Ok(Self {
            metadata,
            root: dir.to_path_buf(),
            train_split: file.train_split,
            data: None,
        })
    }

    /// Every task directory directly below `dir`
    pub fn discover(dir: &Path) -> anyhow::Result<Vec<Self>> {
        let mut tasks = Vec::new();
        let entries =
            std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;
        let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
        paths.sort();

        for path in paths {
            if path.join(TASK_FILE).is_file() {
                tasks.push(Self::from_dir(&path)?);
            }
        }
        Ok(tasks)
    }

    fn subset_dir(&self, subset: &str) -> PathBuf {
        if self.metadata.eval_langs.is_multilingual() {
            self.root.join(subset)
        } else {
            self.root.clone()
        }
    }

    fn load_split(&self, dir: &Path, split: &str) -> anyhow::Result<SplitData> {
        match self.metadata.task_type {
            TaskType::Retrieval => {
                let corpus: Vec<CorpusRow> = read_jsonl(&dir.join("corpus.jsonl"))?;
                let queries: Vec<TextRow> = read_jsonl(&dir.join("queries.jsonl"))?;
                let qrels: Vec<QrelRow> = read_jsonl(&dir.join("qrels").join(format!("{}.jsonl", split)))?;

                let mut relevant_docs: Qrels = HashMap::new();
                for row in qrels {
                    relevant_docs
                        .entry(row.query_id)
                        .or_default()
                        .insert(row.corpus_id, row.score);
                }

                Ok(SplitData::Retrieval(RetrievalSplit {
                    corpus: corpus_from_rows(corpus),
                    queries: queries_from_rows(queries),
                    relevant_docs,
                }))
            }
            TaskType::Classification => {
                let read = |name: &str| -> anyhow::Result<Vec<LabeledText>> {
                    let rows: Vec<LabelRow> = read_jsonl(&dir.join(format!("{}.jsonl", name)))?;
                    Ok(rows
                        .into_iter()
                        .map(|r| LabeledText {
                            text: r.text,
                            label: r.label,
                        })
                        .collect())
                };
                Ok(SplitData::Classification {
                    train: read(&self.train_split)?,
                    test: read(split)?,
                })
            }
            TaskType::Clustering => {
                let rows: Vec<ClusteringRow> = read_jsonl(&dir.join(format!("{}.jsonl", split)))?;
                Ok(SplitData::Clustering(
                    rows.into_iter()
                        .map(|r| ClusteringSet {
                            sentences: r.sentences,
                            labels: r.labels,
                        })
                        .collect(),
                ))
            }
            other => Err(MtebError::UnknownTaskType(other.to_string()).into()),
        }
    }
}

#[async_trait]
impl Task for LocalTask {
    fn metadata(&self) -> &TaskMetadata {
        &self.metadata
    }

    fn data_loaded(&self) -> bool {
        self.data.is_some()
    }

    async fn load_data(&mut self, _source: &DatasetSource) -> anyhow::Result<()> {
        if self.data.is_some() {
            return Ok(());
        }

        let mut data = LocalData::new();
        for (subset, _) in self.metadata.eval_langs.subsets() {
            let dir = self.subset_dir(&subset);
            for split in &self.metadata.eval_splits {
                let split_data = self
                    .load_split(&dir, split)
                    .with_context(|| format!("{}: load {}/{}", self.metadata.name, subset, split))?;
                data.entry(subset.clone()).or_default().insert(split.clone(), split_data);
            }
        }

        info!("Loaded local task {} from {}", self.metadata.name, self.root.display());
        self.data = Some(data);
        Ok(())
    }

    async fn evaluate(
        &self,
        model: &dyn Encoder,
        split: &str,
        options: &EvalOptions,
    ) -> anyhow::Result<Vec<SubsetScores>> {
        let meta = &self.metadata;
        let data = self.data.as_ref().ok_or_else(|| MtebError::MissingSplit {
            task: meta.name.clone(),
            split: split.to_string(),
        })?;

        let mut results = Vec::new();
        for (subset, languages) in meta.eval_langs.subsets() {
            if !options.wants_subset(&subset) {
                continue;
            }
            let split_data = data
                .get(&subset)
                .and_then(|splits| splits.get(split))
                .ok_or_else(|| MtebError::MissingSplit {
                    task: meta.name.clone(),
                    split: if subset == DEFAULT_SUBSET {
                        split.to_string()
                    } else {
                        format!("{}/{}", subset, split)
                    },
                })?;

            let task_type = meta.task_type.as_str();
            let scores = match split_data {
                SplitData::Retrieval(r) => {
                    let mut evaluator = RetrievalEvaluator::new(&meta.name, task_type);
                    evaluator.k_values = options.k_values.clone();
                    evaluator.ignore_identical_ids = options.ignore_identical_ids;
                    evaluator.corpus_chunk_size = options.corpus_chunk_size;
                    evaluator.encode_options = options.encode.clone();
                    evaluator
                        .evaluate(model, &r.corpus, &r.queries, &r.relevant_docs)
                        .await?
                }
                SplitData::Classification { train, test } => {
                    let mut evaluator = ClassificationEvaluator::new(&meta.name, task_type);
                    evaluator.k = options.knn_k;
                    evaluator.n_experiments = options.n_experiments;
                    evaluator.samples_per_label = options.samples_per_label;
                    evaluator.seed = options.seed;
                    evaluator.encode_options = options.encode.clone();
                    evaluator.evaluate(model, train, test).await?
                }
                SplitData::Clustering(sets) => {
                    let mut evaluator = ClusteringEvaluator::new(&meta.name, task_type);
                    evaluator.seed = options.seed;
                    evaluator.encode_options = options.encode.clone();
                    evaluator.evaluate(model, sets).await?
                }
            };

            results.push(SubsetScores {
                hf_subset: subset,
                languages,
                scores,
            });
        }

        Ok(results)
    }
}
