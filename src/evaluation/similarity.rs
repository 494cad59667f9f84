//! Vector similarity helpers shared by the evaluators

use std::cmp::Ordering;

/// L2-normalize a vector in place; zero vectors stay zero
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Normalize every row of an embedding matrix
pub fn normalize_rows(rows: &mut [Vec<f32>]) {
    rows.iter_mut().for_each(|r| normalize(r));
}

#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Order by score descending, ties broken by index ascending
pub fn by_score_desc(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.partial_cmp(&a.1)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.0.cmp(&b.0))
}

/// Top-k rows of `corpus` by dot product with `query`.
///
/// Both sides are expected to be normalized, which makes this cosine
/// similarity. Returns `(row index, score)` sorted best first.
pub fn top_k(query: &[f32], corpus: &[Vec<f32>], k: usize) -> Vec<(usize, f32)> {
    if k == 0 || corpus.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(usize, f32)> = corpus
        .iter()
        .enumerate()
        .map(|(i, doc)| (i, dot(query, doc)))
        .collect();

    if k < scored.len() {
        scored.select_nth_unstable_by(k - 1, by_score_desc);
        scored.truncate(k);
    }
    scored.sort_by(by_score_desc);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_of_normalized_rows_is_cosine() {
        let mut rows = vec![vec![1.0, 2.0], vec![2.0, 4.0], vec![0.0, 3.0]];
        normalize_rows(&mut rows);
        assert!((dot(&rows[0], &rows[1]) - 1.0).abs() < 1e-6);
        assert!((dot(&rows[0], &rows[2]) - 2.0 / 5.0_f32.sqrt()).abs() < 1e-6);
        assert_eq!(dot(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_top_k_order_and_ties() {
        let corpus = vec![vec![0.1], vec![0.9], vec![0.5], vec![0.9]];
        let hits = top_k(&[1.0], &corpus, 3);
        let ids: Vec<usize> = hits.iter().map(|(i, _)| *i).collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }

    #[test]
    fn test_top_k_larger_than_corpus() {
        let corpus = vec![vec![0.2], vec![0.4]];
        let hits = top_k(&[1.0], &corpus, 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 1);
        assert!(top_k(&[1.0], &corpus, 0).is_empty());
    }
}
