//! Dense retrieval evaluation
//!
//! Queries and corpus are encoded through [`model_encode`] with the
//! query/passage prompt types, ranked by cosine similarity and scored with
//! trec-style metrics (`ndcg_at_k`, `map_at_k`, `recall_at_k`,
//! `precision_at_k`, `mrr_at_k`).

use std::collections::{BTreeMap, HashMap};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::model_encode::model_encode;
use super::similarity::{by_score_desc, normalize_rows, top_k};
use super::Scores;
use crate::encoder::{EncodeOptions, Encoder, PromptType};

/// Cutoffs reported for every retrieval task
pub const DEFAULT_K_VALUES: [usize; 7] = [1, 3, 5, 10, 20, 100, 1000];

/// A corpus document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusDoc {
    #[serde(default)]
    pub title: Option<String>,
    pub text: String,
}

impl CorpusDoc {
    /// Text handed to the model: title and body joined by a space
    pub fn full_text(&self) -> String {
        match self.title.as_deref() {
            Some(title) if !title.is_empty() => format!("{} {}", title, self.text).trim().to_string(),
            _ => self.text.trim().to_string(),
        }
    }
}

/// doc id -> document
pub type Corpus = BTreeMap<String, CorpusDoc>;
/// query id -> query text
pub type Queries = BTreeMap<String, String>;
/// query id -> doc id -> relevance grade
pub type Qrels = HashMap<String, HashMap<String, i32>>;
/// query id -> ranked (doc id, score), best first
pub type RankedResults = HashMap<String, Vec<(String, f32)>>;

/// Retrieval evaluator for one subset/split
#[derive(Debug, Clone)]
pub struct RetrievalEvaluator {
    pub task_name: String,
    pub task_type: String,
    pub k_values: Vec<usize>,
    /// Drop hits whose doc id equals the query id
    pub ignore_identical_ids: bool,
    /// Documents encoded per `model_encode` call
    pub corpus_chunk_size: usize,
    pub encode_options: EncodeOptions,
}

impl RetrievalEvaluator {
    pub fn new(task_name: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            task_type: task_type.into(),
            k_values: DEFAULT_K_VALUES.to_vec(),
            ignore_identical_ids: false,
            corpus_chunk_size: 50_000,
            encode_options: EncodeOptions::default(),
        }
    }

    /// Rank the corpus for every query
    pub async fn search(
        &self,
        model: &dyn Encoder,
        corpus: &Corpus,
        queries: &Queries,
    ) -> anyhow::Result<RankedResults> {
        let top = self.k_values.iter().copied().max().unwrap_or(10);
        // Room for the identical-id hit that gets filtered out
        let fetch = if self.ignore_identical_ids { top + 1 } else { top };

        let query_ids: Vec<&String> = queries.keys().collect();
        let query_texts: Vec<String> = queries.values().cloned().collect();

        info!("Encoding {} queries for {}", query_texts.len(), self.task_name);
        let mut query_embeddings = model_encode(
            &query_texts,
            model,
            Some(&self.task_name),
            Some(&self.task_type),
            Some(PromptType::Query),
            &self.encode_options,
        )
        .await?;
        normalize_rows(&mut query_embeddings);

        let doc_ids: Vec<&String> = corpus.keys().collect();
        let mut candidates: Vec<Vec<(usize, f32)>> = vec![Vec::new(); query_ids.len()];

        for (chunk_idx, chunk) in doc_ids.chunks(self.corpus_chunk_size.max(1)).enumerate() {
            let offset = chunk_idx * self.corpus_chunk_size.max(1);
            let texts: Vec<String> = chunk.iter().map(|id| corpus[*id].full_text()).collect();

            info!(
                "Encoding corpus chunk {} ({} documents) for {}",
                chunk_idx + 1,
                texts.len(),
                self.task_name
            );
            let mut doc_embeddings = model_encode(
                &texts,
                model,
                Some(&self.task_name),
                Some(&self.task_type),
                Some(PromptType::Passage),
                &self.encode_options,
            )
            .await?;
            normalize_rows(&mut doc_embeddings);

            for (q, query_embedding) in query_embeddings.iter().enumerate() {
                let hits = top_k(query_embedding, &doc_embeddings, fetch);
                let merged = &mut candidates[q];
                merged.extend(hits.into_iter().map(|(i, s)| (i + offset, s)));
                merged.sort_by(by_score_desc);
                merged.truncate(fetch);
            }
        }

        let mut results = RankedResults::with_capacity(query_ids.len());
        for (q, hits) in candidates.into_iter().enumerate() {
            let query_id = query_ids[q];
            let ranked: Vec<(String, f32)> = hits
                .into_iter()
                .map(|(i, s)| (doc_ids[i].clone(), s))
                .filter(|(doc_id, _)| !(self.ignore_identical_ids && doc_id == query_id))
                .take(top)
                .collect();
            results.insert(query_id.clone(), ranked);
        }

        debug!("Ranked {} queries", results.len());
        Ok(results)
    }

    /// Rank and score against relevance judgments
    pub async fn evaluate(
        &self,
        model: &dyn Encoder,
        corpus: &Corpus,
        queries: &Queries,
        qrels: &Qrels,
    ) -> anyhow::Result<Scores> {
        let results = self.search(model, corpus, queries).await?;
        Ok(evaluate_ranking(qrels, &results, &self.k_values))
    }
}

/// Per-query scores at every cutoff, averaged over judged queries.
///
/// Only queries present in both `qrels` and `results` count, matching
/// trec_eval. Grades `<= 0` are non-relevant. With no such query every
/// metric is reported as 0.
pub fn evaluate_ranking(qrels: &Qrels, results: &RankedResults, k_values: &[usize]) -> Scores {
    let mut sums: BTreeMap<String, f64> = BTreeMap::new();
    let mut evaluated = 0usize;

    for (query_id, judgments) in qrels {
        let Some(ranked) = results.get(query_id) else {
            continue;
        };
        evaluated += 1;

        let grades: FxHashMap<&str, i32> = judgments
            .iter()
            .map(|(doc, &grade)| (doc.as_str(), grade.max(0)))
            .collect();
        let relevant: FxHashSet<&str> = grades
            .iter()
            .filter(|(_, &g)| g > 0)
            .map(|(d, _)| *d)
            .collect();

        for &k in k_values {
            let metrics = [
                ("ndcg", ndcg_at_k(ranked, &grades, k)),
                ("map", average_precision_at_k(ranked, &relevant, k)),
                ("recall", recall_at_k(ranked, &relevant, k)),
                ("precision", precision_at_k(ranked, &relevant, k)),
                ("mrr", reciprocal_rank_at_k(ranked, &relevant, k)),
            ];
            for (name, value) in metrics {
                *sums.entry(format!("{}_at_{}", name, k)).or_insert(0.0) += value;
            }
        }
    }

    if evaluated == 0 {
        warn!(
            "No judged query has a ranking ({} judged, {} ranked), scoring 0",
            qrels.len(),
            results.len()
        );
        return k_values
            .iter()
            .flat_map(|k| {
                ["ndcg", "map", "recall", "precision", "mrr"]
                    .into_iter()
                    .map(move |name| (format!("{}_at_{}", name, k), 0.0))
            })
            .collect();
    }

    sums.into_iter()
        .map(|(name, sum)| (name, round5(sum / evaluated as f64)))
        .collect()
}

pub(crate) fn round5(x: f64) -> f64 {
    (x * 100_000.0).round() / 100_000.0
}

/// NDCG@k with linear gain and log2 discount
pub fn ndcg_at_k(ranked: &[(String, f32)], grades: &FxHashMap<&str, i32>, k: usize) -> f64 {
    let dcg: f64 = ranked
        .iter()
        .take(k)
        .enumerate()
        .map(|(i, (doc, _))| {
            let grade = grades.get(doc.as_str()).copied().unwrap_or(0);
            grade as f64 / discount(i)
        })
        .sum();

    let mut ideal: Vec<i32> = grades.values().copied().filter(|&g| g > 0).collect();
    ideal.sort_unstable_by(|a, b| b.cmp(a));
    let idcg: f64 = ideal
        .iter()
        .take(k)
        .enumerate()
        .map(|(i, &g)| g as f64 / discount(i))
        .sum();

    if idcg == 0.0 {
        0.0
    } else {
        dcg / idcg
    }
}

/// log2(rank + 1) for a 0-based position
#[inline]
fn discount(position: usize) -> f64 {
    (position as f64 + 2.0).log2()
}

/// Average precision truncated at k, normalized by all relevant documents
pub fn average_precision_at_k(ranked: &[(String, f32)], relevant: &FxHashSet<&str>, k: usize) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }

    let mut found = 0usize;
    let mut precision_sum = 0.0;
    for (i, (doc, _)) in ranked.iter().take(k).enumerate() {
        if relevant.contains(doc.as_str()) {
            found += 1;
            precision_sum += found as f64 / (i + 1) as f64;
        }
    }

    precision_sum / relevant.len() as f64
}

pub fn recall_at_k(ranked: &[(String, f32)], relevant: &FxHashSet<&str>, k: usize) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    hits_at_k(ranked, relevant, k) as f64 / relevant.len() as f64
}

/// Precision@k; the denominator is always k, even when fewer results exist
pub fn precision_at_k(ranked: &[(String, f32)], relevant: &FxHashSet<&str>, k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    hits_at_k(ranked, relevant, k) as f64 / k as f64
}

pub fn reciprocal_rank_at_k(ranked: &[(String, f32)], relevant: &FxHashSet<&str>, k: usize) -> f64 {
    ranked
        .iter()
        .take(k)
        .position(|(doc, _)| relevant.contains(doc.as_str()))
        .map(|i| 1.0 / (i + 1) as f64)
        .unwrap_or(0.0)
}

fn hits_at_k(ranked: &[(String, f32)], relevant: &FxHashSet<&str>, k: usize) -> usize {
    ranked
        .iter()
        .take(k)
        .filter(|(doc, _)| relevant.contains(doc.as_str()))
        .count()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::encoder::PromptMap;

    fn ranked(ids: &[&str]) -> Vec<(String, f32)> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| (id.to_string(), 1.0 - i as f32 * 0.1))
            .collect()
    }

    fn set<'a>(ids: &[&'a str]) -> FxHashSet<&'a str> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_ndcg_perfect_and_swapped() {
        let grades: FxHashMap<&str, i32> = [("a", 2), ("b", 1)].into_iter().collect();
        assert!((ndcg_at_k(&ranked(&["a", "b", "c"]), &grades, 10) - 1.0).abs() < 1e-9);

        let swapped = ndcg_at_k(&ranked(&["b", "a"]), &grades, 10);
        let expected = (1.0 + 2.0 / 3f64.log2()) / (2.0 + 1.0 / 3f64.log2());
        assert!((swapped - expected).abs() < 1e-9);
    }

    #[test]
    fn test_ndcg_no_relevant_is_zero() {
        let grades: FxHashMap<&str, i32> = [("a", 0)].into_iter().collect();
        assert_eq!(ndcg_at_k(&ranked(&["a"]), &grades, 10), 0.0);
    }

    #[test]
    fn test_map_counts_all_relevant() {
        // relevant at ranks 1 and 3, third relevant never retrieved
        let ap = average_precision_at_k(&ranked(&["a", "x", "b"]), &set(&["a", "b", "c"]), 10);
        assert!((ap - (1.0 + 2.0 / 3.0) / 3.0).abs() < 1e-9);

        let cut = average_precision_at_k(&ranked(&["a", "x", "b"]), &set(&["a", "b", "c"]), 2);
        assert!((cut - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_precision_recall_mrr() {
        let r = ranked(&["x", "a", "y", "b"]);
        let rel = set(&["a", "b"]);
        assert_eq!(precision_at_k(&r, &rel, 2), 0.5);
        assert_eq!(precision_at_k(&r, &rel, 10), 0.2);
        assert_eq!(recall_at_k(&r, &rel, 2), 0.5);
        assert_eq!(recall_at_k(&r, &rel, 4), 1.0);
        assert_eq!(reciprocal_rank_at_k(&r, &rel, 10), 0.5);
        assert_eq!(reciprocal_rank_at_k(&r, &rel, 1), 0.0);
    }

    #[test]
    fn test_evaluate_ranking_averages_judged_queries() {
        let mut qrels = Qrels::new();
        qrels.insert("q1".into(), [("d1".to_string(), 1)].into_iter().collect());
        qrels.insert("q2".into(), [("d2".to_string(), 1)].into_iter().collect());
        qrels.insert("q3".into(), [("d3".to_string(), 1)].into_iter().collect());

        let mut results = RankedResults::new();
        results.insert("q1".into(), ranked(&["d1", "d2"]));
        results.insert("q2".into(), ranked(&["d1", "d3"]));
        // q3 has no results and is skipped

        let scores = evaluate_ranking(&qrels, &results, &[1, 10]);
        assert_eq!(scores["recall_at_1"], 0.5);
        assert_eq!(scores["mrr_at_10"], 0.5);
        assert_eq!(scores["precision_at_1"], 0.5);
        assert!(scores.contains_key("ndcg_at_10"));
        assert!(scores.contains_key("map_at_1"));
    }

    #[test]
    fn test_evaluate_ranking_without_judged_queries_scores_zero() {
        let mut results = RankedResults::new();
        results.insert("q1".into(), ranked(&["d1"]));

        let scores = evaluate_ranking(&Qrels::new(), &results, &[1, 10]);
        assert_eq!(scores.len(), 10);
        assert_eq!(scores["ndcg_at_10"], 0.0);
        assert_eq!(scores["mrr_at_1"], 0.0);
        assert!(scores.values().all(|v| *v == 0.0));
    }

    #[test]
    fn test_full_text_joins_title() {
        let doc = CorpusDoc {
            title: Some("Title".into()),
            text: "body ".into(),
        };
        assert_eq!(doc.full_text(), "Title body");
        let untitled = CorpusDoc {
            title: Some(String::new()),
            text: " body".into(),
        };
        assert_eq!(untitled.full_text(), "body");
    }

    /// One-hot "embeddings" keyed on the first character
    struct FirstLetter;

    #[async_trait]
    impl Encoder for FirstLetter {
        fn name(&self) -> &str {
            "first-letter"
        }

        fn prompts(&self) -> Option<&PromptMap> {
            None
        }

        async fn encode(&self, sentences: &[String], _options: &EncodeOptions) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(sentences
                .iter()
                .map(|s| {
                    let mut v = vec![0.0; 26];
                    if let Some(c) = s.bytes().next().filter(u8::is_ascii_lowercase) {
                        v[(c - b'a') as usize] = 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_search_and_evaluate_end_to_end() {
        let corpus: Corpus = [
            ("d1", "apple pie"),
            ("d2", "banana bread"),
            ("d3", "cherry tart"),
        ]
        .into_iter()
        .map(|(id, text)| {
            (
                id.to_string(),
                CorpusDoc {
                    title: None,
                    text: text.to_string(),
                },
            )
        })
        .collect();
        let queries: Queries = [("q1", "a fruit"), ("q2", "c fruit")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut qrels = Qrels::new();
        qrels.insert("q1".into(), [("d1".to_string(), 1)].into_iter().collect());
        qrels.insert("q2".into(), [("d3".to_string(), 1)].into_iter().collect());

        let mut evaluator = RetrievalEvaluator::new("Fruit", "Retrieval");
        evaluator.corpus_chunk_size = 2;
        let scores = evaluator.evaluate(&FirstLetter, &corpus, &queries, &qrels).await.unwrap();

        assert_eq!(scores["ndcg_at_1"], 1.0);
        assert_eq!(scores["recall_at_3"], 1.0);
        assert_eq!(scores["precision_at_1"], 1.0);
    }

    #[tokio::test]
    async fn test_ignore_identical_ids() {
        let corpus: Corpus = [("same", "apple"), ("other", "avocado")]
            .into_iter()
            .map(|(id, text)| {
                (
                    id.to_string(),
                    CorpusDoc {
                        title: None,
                        text: text.to_string(),
                    },
                )
            })
            .collect();
        let queries: Queries = [("same".to_string(), "apple".to_string())].into_iter().collect();

        let mut evaluator = RetrievalEvaluator::new("Dup", "Retrieval");
        evaluator.k_values = vec![1];
        evaluator.ignore_identical_ids = true;
        let results = evaluator.search(&FirstLetter, &corpus, &queries).await.unwrap();

        assert_eq!(results["same"].len(), 1);
        assert_eq!(results["same"][0].0, "other");
    }
}
