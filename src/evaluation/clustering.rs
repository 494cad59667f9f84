//! Clustering evaluation: k-means over embeddings scored by V-measure

use std::collections::{BTreeMap, HashMap};

use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::model_encode::model_encode;
use super::retrieval::round5;
use super::similarity::normalize_rows;
use super::Scores;
use crate::encoder::{EncodeOptions, Encoder};

/// One set of sentences with gold cluster labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringSet {
    pub sentences: Vec<String>,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ClusteringEvaluator {
    pub task_name: String,
    pub task_type: String,
    pub max_iterations: usize,
    pub seed: u64,
    pub encode_options: EncodeOptions,
}

impl ClusteringEvaluator {
    pub fn new(task_name: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            task_type: task_type.into(),
            max_iterations: 300,
            seed: 42,
            encode_options: EncodeOptions::default(),
        }
    }

    /// V-measure per set, reported as mean and standard deviation
    pub async fn evaluate(&self, model: &dyn Encoder, sets: &[ClusteringSet]) -> anyhow::Result<Scores> {
        let mut v_measures = Vec::with_capacity(sets.len());
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        for (i, set) in sets.iter().enumerate() {
            if set.sentences.len() != set.labels.len() {
                anyhow::bail!(
                    "{}: clustering set {} has {} sentences but {} labels",
                    self.task_name,
                    i,
                    set.sentences.len(),
                    set.labels.len()
                );
            }
            if set.sentences.is_empty() {
                warn!("{}: skipping empty clustering set {}", self.task_name, i);
                continue;
            }

            let mut embeddings = model_encode(
                &set.sentences,
                model,
                Some(&self.task_name),
                Some(&self.task_type),
                None,
                &self.encode_options,
            )
            .await?;
            normalize_rows(&mut embeddings);

            let n_clusters = set.labels.iter().collect::<std::collections::BTreeSet<_>>().len();
            let assignments = kmeans(&embeddings, n_clusters, self.max_iterations, &mut rng);
            let score = v_measure(&set.labels, &assignments);
            debug!("{}: set {} v_measure {:.4}", self.task_name, i, score);
            v_measures.push(score);
        }

        if v_measures.is_empty() {
            anyhow::bail!("{}: no clustering sets to evaluate", self.task_name);
        }

        let n = v_measures.len() as f64;
        let mean = v_measures.iter().sum::<f64>() / n;
        let std = (v_measures.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();

        info!("{}: v_measure {:.4} over {} sets", self.task_name, mean, v_measures.len());

        Ok(BTreeMap::from([
            ("v_measure".to_string(), round5(mean)),
            ("v_measure_std".to_string(), round5(std)),
        ]))
    }
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Lloyd's k-means with k-means++ seeding; returns a cluster index per row
pub fn kmeans(points: &[Vec<f32>], k: usize, max_iterations: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
    let n = points.len();
    if n == 0 || k <= 1 {
        return vec![0; n];
    }
    let k = k.min(n);

    let mut centroids = kmeans_plus_plus_init(points, k, rng);
    let mut assignments = vec![usize::MAX; n];

    for iteration in 0..max_iterations.max(1) {
        let mut changed = false;
        for (i, point) in points.iter().enumerate() {
            let nearest = nearest_centroid(point, &centroids);
            if assignments[i] != nearest {
                assignments[i] = nearest;
                changed = true;
            }
        }

        if !changed {
            debug!("k-means converged after {} iterations", iteration);
            break;
        }

        update_centroids(points, &assignments, &mut centroids);
    }

    assignments
}

fn nearest_centroid(point: &[f32], centroids: &[Vec<f32>]) -> usize {
    centroids
        .iter()
        .enumerate()
        .map(|(j, c)| (j, squared_distance(point, c)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(j, _)| j)
        .unwrap_or(0)
}

/// Pick the first centroid uniformly, the rest with probability ∝ D²
fn kmeans_plus_plus_init(points: &[Vec<f32>], k: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<f32>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..points.len())].clone());

    let mut min_distances = vec![f32::MAX; points.len()];
    while centroids.len() < k {
        if let Some(last) = centroids.last() {
            for (i, point) in points.iter().enumerate() {
                min_distances[i] = min_distances[i].min(squared_distance(point, last));
            }
        }

        let next = match WeightedIndex::new(&min_distances) {
            Ok(dist) => dist.sample(rng),
            // Every point already sits on a centroid
            Err(_) => rng.gen_range(0..points.len()),
        };
        centroids.push(points[next].clone());
    }

    centroids
}

/// Move each centroid to the mean of its members; empty clusters keep their place
fn update_centroids(points: &[Vec<f32>], assignments: &[usize], centroids: &mut [Vec<f32>]) {
    let dims = points[0].len();
    let mut sums = vec![vec![0.0f32; dims]; centroids.len()];
    let mut counts = vec![0usize; centroids.len()];

    for (point, &cluster) in points.iter().zip(assignments) {
        counts[cluster] += 1;
        for (s, x) in sums[cluster].iter_mut().zip(point) {
            *s += x;
        }
    }

    for ((centroid, sum), count) in centroids.iter_mut().zip(sums).zip(counts) {
        if count > 0 {
            *centroid = sum.into_iter().map(|s| s / count as f32).collect();
        }
    }
}

/// V-measure (beta = 1): harmonic mean of homogeneity and completeness
pub fn v_measure<L: AsRef<str>>(gold: &[L], predicted: &[usize]) -> f64 {
    let n = gold.len() as f64;
    if gold.is_empty() {
        return 1.0;
    }

    let mut contingency: HashMap<(&str, usize), usize> = HashMap::new();
    let mut class_counts: HashMap<&str, usize> = HashMap::new();
    let mut cluster_counts: HashMap<usize, usize> = HashMap::new();
    for (label, &cluster) in gold.iter().zip(predicted) {
        *contingency.entry((label.as_ref(), cluster)).or_insert(0) += 1;
        *class_counts.entry(label.as_ref()).or_insert(0) += 1;
        *cluster_counts.entry(cluster).or_insert(0) += 1;
    }

    let entropy = |counts: &mut dyn Iterator<Item = usize>| -> f64 {
        counts
            .map(|c| {
                let p = c as f64 / n;
                -p * p.ln()
            })
            .sum()
    };
    let h_class = entropy(&mut class_counts.values().copied());
    let h_cluster = entropy(&mut cluster_counts.values().copied());

    // H(C|K) and H(K|C) from the joint distribution
    let mut h_class_given_cluster = 0.0;
    let mut h_cluster_given_class = 0.0;
    for (&(label, cluster), &count) in &contingency {
        let joint = count as f64 / n;
        h_class_given_cluster -= joint * (count as f64 / cluster_counts[&cluster] as f64).ln();
        h_cluster_given_class -= joint * (count as f64 / class_counts[label] as f64).ln();
    }

    let homogeneity = if h_class == 0.0 {
        1.0
    } else {
        1.0 - h_class_given_cluster / h_class
    };
    let completeness = if h_cluster == 0.0 {
        1.0
    } else {
        1.0 - h_cluster_given_class / h_cluster
    };

    if homogeneity + completeness == 0.0 {
        0.0
    } else {
        2.0 * homogeneity * completeness / (homogeneity + completeness)
    }
}
