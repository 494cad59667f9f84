//! Evaluation - prompt-aware encoding and the per-task-type evaluators

pub mod classification;
pub mod clustering;
pub mod model_encode;
pub mod retrieval;
pub mod similarity;

use std::collections::BTreeMap;

pub use classification::{ClassificationEvaluator, LabeledText};
pub use clustering::{ClusteringEvaluator, ClusteringSet};
pub use retrieval::{Corpus, CorpusDoc, Qrels, Queries, RetrievalEvaluator};

/// Metric name -> value for one subset of one split
pub type Scores = BTreeMap<String, f64>;
