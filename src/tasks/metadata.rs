//! Task metadata - what a task evaluates and where its data lives

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::datasets::DatasetRef;
use crate::error::MtebError;

/// Benchmark task families; the string forms double as prompt keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskType {
    Retrieval,
    Classification,
    Clustering,
    #[serde(rename = "STS")]
    Sts,
    PairClassification,
    BitextMining,
    MultilabelClassification,
    Reranking,
    Summarization,
}

impl TaskType {
    pub const ALL: [TaskType; 9] = [
        TaskType::Retrieval,
        TaskType::Classification,
        TaskType::Clustering,
        TaskType::Sts,
        TaskType::PairClassification,
        TaskType::BitextMining,
        TaskType::MultilabelClassification,
        TaskType::Reranking,
        TaskType::Summarization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Retrieval => "Retrieval",
            TaskType::Classification => "Classification",
            TaskType::Clustering => "Clustering",
            TaskType::Sts => "STS",
            TaskType::PairClassification => "PairClassification",
            TaskType::BitextMining => "BitextMining",
            TaskType::MultilabelClassification => "MultilabelClassification",
            TaskType::Reranking => "Reranking",
            TaskType::Summarization => "Summarization",
        }
    }

    /// Metric a task of this type reports as its headline score
    pub fn default_main_score(&self) -> &'static str {
        match self {
            TaskType::Retrieval => "ndcg_at_10",
            TaskType::Classification | TaskType::MultilabelClassification => "accuracy",
            TaskType::Clustering => "v_measure",
            TaskType::Sts | TaskType::Summarization => "cosine_spearman",
            TaskType::PairClassification => "max_ap",
            TaskType::BitextMining => "f1",
            TaskType::Reranking => "map",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = MtebError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| MtebError::UnknownTaskType(s.to_string()))
    }
}

/// Evaluation languages: a flat list, or one list per dataset subset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EvalLangs {
    Monolingual(Vec<String>),
    Multilingual(BTreeMap<String, Vec<String>>),
}

/// Subset name used for monolingual tasks
pub const DEFAULT_SUBSET: &str = "default";

impl EvalLangs {
    /// `(hf_subset, languages)` pairs in evaluation order
    pub fn subsets(&self) -> Vec<(String, Vec<String>)> {
        match self {
            EvalLangs::Monolingual(langs) => vec![(DEFAULT_SUBSET.to_string(), langs.clone())],
            EvalLangs::Multilingual(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }

    pub fn languages(&self) -> Vec<String> {
        let mut langs: Vec<String> = self.subsets().into_iter().flat_map(|(_, l)| l).collect();
        langs.sort();
        langs.dedup();
        langs
    }

    pub fn is_multilingual(&self) -> bool {
        matches!(self, EvalLangs::Multilingual(_))
    }
}

/// `eng` matches `eng-Latn`; full codes must match exactly
pub fn language_matches(wanted: &str, code: &str) -> bool {
    code == wanted
        || code
            .split_once(['-', '_'])
            .map(|(lang, _)| lang == wanted)
            .unwrap_or(false)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub reference: Option<String>,
    pub dataset: DatasetRef,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_modalities")]
    pub modalities: Vec<String>,
    pub eval_splits: Vec<String>,
    pub eval_langs: EvalLangs,
    pub main_score: String,
    #[serde(default)]
    pub bibtex_citation: Option<String>,
}

fn default_modalities() -> Vec<String> {
    vec!["text".to_string()]
}

impl TaskMetadata {
    /// Subsets to evaluate given a language filter (empty filter keeps all)
    pub fn subsets_for_languages(&self, languages: &[String]) -> Vec<(String, Vec<String>)> {
        self.eval_langs
            .subsets()
            .into_iter()
            .filter(|(_, langs)| {
                languages.is_empty()
                    || langs
                        .iter()
                        .any(|code| languages.iter().any(|w| language_matches(w, code)))
            })
            .collect()
    }
}
