//! kNN classification evaluation over undersampled training sets

use std::collections::{BTreeMap, BTreeSet};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::model_encode::{model_encode, Embeddings};
use super::retrieval::round5;
use super::similarity::{dot, normalize_rows};
use super::Scores;
use crate::encoder::{EncodeOptions, Encoder};

/// One labelled example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledText {
    pub text: String,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct ClassificationEvaluator {
    pub task_name: String,
    pub task_type: String,
    /// Neighbours that vote
    pub k: usize,
    /// Independent undersampling rounds; scores are averaged
    pub n_experiments: usize,
    /// Training examples kept per label; `None` keeps all and runs once
    pub samples_per_label: Option<usize>,
    pub seed: u64,
    pub encode_options: EncodeOptions,
}

impl ClassificationEvaluator {
    pub fn new(task_name: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            task_type: task_type.into(),
            k: 5,
            n_experiments: 10,
            samples_per_label: Some(8),
            seed: 42,
            encode_options: EncodeOptions::default(),
        }
    }

    pub async fn evaluate(
        &self,
        model: &dyn Encoder,
        train: &[LabeledText],
        test: &[LabeledText],
    ) -> anyhow::Result<Scores> {
        if train.is_empty() || test.is_empty() {
            anyhow::bail!("{}: classification needs non-empty train and test sets", self.task_name);
        }

        let train_embeddings = self.encode(model, train).await?;
        let test_embeddings = self.encode(model, test).await?;
        let train_labels: Vec<&str> = train.iter().map(|t| t.label.as_str()).collect();
        let test_labels: Vec<&str> = test.iter().map(|t| t.label.as_str()).collect();

        let experiments = if self.samples_per_label.is_some() {
            self.n_experiments.max(1)
        } else {
            1
        };
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut totals: Scores = BTreeMap::new();

        for experiment in 0..experiments {
            let sample = match self.samples_per_label {
                Some(n) => undersample(&train_labels, n, &mut rng),
                None => (0..train.len()).collect(),
            };
            debug!("Experiment {}: {} training examples", experiment + 1, sample.len());

            let predicted: Vec<&str> = test_embeddings
                .iter()
                .map(|query| knn_predict(query, &train_embeddings, &train_labels, &sample, self.k))
                .collect();

            let scores = [
                ("accuracy", accuracy(&test_labels, &predicted)),
                ("f1", macro_f1(&test_labels, &predicted)),
            ];
            for (name, value) in scores {
                *totals.entry(name.to_string()).or_insert(0.0) += value;
            }
        }

        let scores: Scores = totals
            .into_iter()
            .map(|(name, sum)| (name, round5(sum / experiments as f64)))
            .collect();

        info!("{}: accuracy {:.4}", self.task_name, scores["accuracy"]);
        Ok(scores)
    }

    async fn encode(&self, model: &dyn Encoder, rows: &[LabeledText]) -> anyhow::Result<Embeddings> {
        let texts: Vec<String> = rows.iter().map(|r| r.text.clone()).collect();
        let mut embeddings = model_encode(
            &texts,
            model,
            Some(&self.task_name),
            Some(&self.task_type),
            None,
            &self.encode_options,
        )
        .await?;
        normalize_rows(&mut embeddings);
        Ok(embeddings)
    }
}

/// Shuffle indices and keep at most `per_label` of each label
fn undersample(labels: &[&str], per_label: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
    let mut order: Vec<usize> = (0..labels.len()).collect();
    order.shuffle(rng);

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    order
        .into_iter()
        .filter(|&i| {
            let count = counts.entry(labels[i]).or_insert(0);
            *count += 1;
            *count <= per_label
        })
        .collect()
}

/// Majority vote of the `k` most similar training rows.
///
/// Ties go to the label with the larger summed similarity, then the
/// lexicographically smaller label.
fn knn_predict<'a>(
    query: &[f32],
    train: &[Vec<f32>],
    labels: &[&'a str],
    sample: &[usize],
    k: usize,
) -> &'a str {
    let mut scored: Vec<(usize, f32)> = sample.iter().map(|&i| (i, dot(query, &train[i]))).collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k.max(1));

    let mut votes: BTreeMap<&str, (usize, f32)> = BTreeMap::new();
    for (i, sim) in scored {
        let entry = votes.entry(labels[i]).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += sim;
    }

    votes
        .into_iter()
        .max_by(|(la, a), (lb, b)| {
            a.0.cmp(&b.0)
                .then(a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .then(lb.cmp(la))
        })
        .map(|(label, _)| label)
        .unwrap_or("")
}

pub fn accuracy(gold: &[&str], predicted: &[&str]) -> f64 {
    if gold.is_empty() {
        return 0.0;
    }
    let correct = gold.iter().zip(predicted).filter(|(g, p)| g == p).count();
    correct as f64 / gold.len() as f64
}

/// Unweighted mean of per-label F1 over labels seen in gold or predictions
pub fn macro_f1(gold: &[&str], predicted: &[&str]) -> f64 {
    let labels: BTreeSet<&str> = gold.iter().chain(predicted.iter()).copied().collect();
    if labels.is_empty() {
        return 0.0;
    }

    let total: f64 = labels
        .iter()
        .map(|&label| {
            let pairs = gold.iter().zip(predicted);
            let tp = pairs.clone().filter(|(g, p)| **g == label && **p == label).count() as f64;
            let fp = pairs.clone().filter(|(g, p)| **g != label && **p == label).count() as f64;
            let fn_ = pairs.filter(|(g, p)| **g == label && **p != label).count() as f64;
            if tp == 0.0 {
                0.0
            } else {
                2.0 * tp / (2.0 * tp + fp + fn_)
            }
        })
        .sum();

    total / labels.len() as f64
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::encoder::PromptMap;

    #[test]
    fn test_accuracy_and_macro_f1() {
        let gold = ["a", "a", "b", "b"];
        let pred = ["a", "b", "b", "b"];
        assert_eq!(accuracy(&gold, &pred), 0.75);
        // a: tp1 fp0 fn1 -> 2/3; b: tp2 fp1 fn0 -> 4/5
        assert!((macro_f1(&gold, &pred) - (2.0 / 3.0 + 0.8) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_undersample_caps_each_label() {
        let labels = ["x", "x", "x", "y", "y", "z"];
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let sample = undersample(&labels, 2, &mut rng);
        assert_eq!(sample.len(), 5);
        assert_eq!(sample.iter().filter(|&&i| labels[i] == "x").count(), 2);
    }

    #[test]
    fn test_undersample_is_seeded() {
        let labels = ["x"; 20];
        let a = undersample(&labels, 3, &mut ChaCha8Rng::seed_from_u64(1));
        let b = undersample(&labels, 3, &mut ChaCha8Rng::seed_from_u64(1));
        assert_eq!(a, b);
    }

    #[test]
    fn test_knn_majority_vote() {
        let train = vec![vec![1.0, 0.0], vec![0.9, 0.1], vec![0.0, 1.0]];
        let labels = ["pos", "pos", "neg"];
        assert_eq!(knn_predict(&[1.0, 0.0], &train, &labels, &[0, 1, 2], 3), "pos");
        assert_eq!(knn_predict(&[0.0, 1.0], &train, &labels, &[0, 1, 2], 1), "neg");
    }

    struct Sentiment;

    #[async_trait]
    impl Encoder for Sentiment {
        fn name(&self) -> &str {
            "sentiment"
        }

        fn prompts(&self) -> Option<&PromptMap> {
            None
        }

        async fn encode(&self, sentences: &[String], _options: &EncodeOptions) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(sentences
                .iter()
                .map(|s| if s.contains("good") { vec![1.0, 0.1] } else { vec![0.1, 1.0] })
                .collect())
        }
    }

    fn rows(items: &[(&str, &str)]) -> Vec<LabeledText> {
        items
            .iter()
            .map(|(text, label)| LabeledText {
                text: text.to_string(),
                label: label.to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_evaluate_separable_data() {
        let train = rows(&[
            ("good film", "pos"),
            ("good plot", "pos"),
            ("bad film", "neg"),
            ("bad plot", "neg"),
        ]);
        let test = rows(&[("good acting", "pos"), ("awful acting", "neg")]);

        let mut evaluator = ClassificationEvaluator::new("Toy", "Classification");
        evaluator.k = 1;
        evaluator.n_experiments = 3;
        let scores = evaluator.evaluate(&Sentiment, &train, &test).await.unwrap();

        assert_eq!(scores["accuracy"], 1.0);
        assert_eq!(scores["f1"], 1.0);
    }

    #[tokio::test]
    async fn test_evaluate_rejects_empty_split() {
        let evaluator = ClassificationEvaluator::new("Toy", "Classification");
        assert!(evaluator.evaluate(&Sentiment, &[], &rows(&[("good", "pos")])).await.is_err());
    }
}
