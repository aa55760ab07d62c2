//! Top-K classification scoring

use crate::stats::round_to;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Number of predictions reported for a classification run
pub const DEFAULT_TOP_K: usize = 5;

/// Decimal places kept for reported confidences
const CONFIDENCE_PLACES: u32 = 6;

/// One ranked class prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Index into the model's label space
    pub class_id: usize,
    /// Normalized score, rounded to 6 decimals
    pub confidence: f64,
}

/// Return the `k` highest-scoring classes in descending score order
///
/// Ties are ordered by ascending class index. Returns all entries when the
/// vocabulary is smaller than `k`.
#[must_use]
pub fn top_k(scores: &[f32], k: usize) -> Vec<Prediction> {
    let mut ranked: Vec<usize> = (0..scores.len()).collect();
    ranked.sort_by(|&a, &b| match scores[b].total_cmp(&scores[a]) {
        Ordering::Equal => a.cmp(&b),
        other => other,
    });

    ranked
        .into_iter()
        .take(k)
        .map(|class_id| Prediction {
            class_id,
            confidence: round_to(f64::from(scores[class_id]), CONFIDENCE_PLACES),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proptest_impl::score_vector_strategy;
    use crate::quant::Normalizer;
    use proptest::prelude::*;

    #[test]
    fn test_top_k_order() {
        let preds = top_k(&[0.1, 0.5, 0.05, 0.3, 0.05], 3);
        let ids: Vec<usize> = preds.iter().map(|p| p.class_id).collect();
        assert_eq!(ids, vec![1, 3, 0]);
        assert_eq!(preds[0].confidence, 0.5);
    }

    #[test]
    fn test_top_k_small_vocabulary() {
        let preds = top_k(&[0.4, 0.6], 5);
        assert_eq!(preds.len(), 2);
        assert_eq!(preds[0].class_id, 1);
    }

    #[test]
    fn test_top_k_ties_by_index() {
        let preds = top_k(&[0.25, 0.25, 0.25, 0.25], 4);
        let ids: Vec<usize> = preds.iter().map(|p| p.class_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_top_k_empty() {
        assert!(top_k(&[], 5).is_empty());
    }

    #[test]
    fn test_confidence_rounded() {
        let preds = top_k(&[0.123_456_78], 1);
        assert_eq!(preds[0].confidence, 0.123_457);
    }

    #[test]
    fn test_logit_vector_end_to_end() {
        let normalized = Normalizer::default().normalize(&[0.1, 12.0, 0.3, 0.2, 11.5], None);
        let preds = top_k(&normalized.scores, DEFAULT_TOP_K);

        assert_eq!(preds.len(), 5);
        assert_eq!(preds[0].class_id, 1);
        assert_eq!(preds[1].class_id, 4);
        assert!(preds[0].confidence > preds[1].confidence);
        for low in &preds[2..] {
            assert!([0, 2, 3].contains(&low.class_id));
            assert!(preds[1].confidence > low.confidence);
        }
    }

    #[test]
    fn test_prediction_serialization() {
        let pred = Prediction {
            class_id: 7,
            confidence: 0.25,
        };
        let json = serde_json::to_string(&pred).unwrap();
        assert_eq!(json, r#"{"class_id":7,"confidence":0.25}"#);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_top_k_len_and_order(scores in score_vector_strategy()) {
            let preds = top_k(&scores, DEFAULT_TOP_K);
            prop_assert_eq!(preds.len(), scores.len().min(DEFAULT_TOP_K));
            for pair in preds.windows(2) {
                prop_assert!(pair[0].confidence >= pair[1].confidence);
            }
        }

        #[test]
        fn prop_top_1_is_maximum(scores in score_vector_strategy()) {
            let preds = top_k(&scores, 1);
            let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            prop_assert_eq!(scores[preds[0].class_id], max);
        }
    }
}
