//! Proptest strategies for output tensors
//!
//! Shared by the property tests in this crate and, behind the `proptest`
//! feature, by downstream test suites.

use crate::ctc::BLANK_INDEX;
use proptest::prelude::*;

/// Strategy for finite, non-uniform score vectors (1..=1000 classes)
pub fn score_vector_strategy() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(0.0f32..1.0, 1..1000).prop_map(|mut v| {
        // Guarantee at least one score above the uniformity threshold
        v[0] += 0.01;
        v
    })
}

/// Strategy for raw logit vectors that trip the softmax heuristic
pub fn logit_vector_strategy() -> impl Strategy<Value = Vec<f32>> {
    (prop::collection::vec(-20.0f32..20.0, 1..1000), 10.5f32..40.0).prop_map(
        |(mut v, peak)| {
            let idx = v.len() / 2;
            v[idx] = peak;
            v
        },
    )
}

/// Strategy for vectors containing at least one NaN or Inf
pub fn poisoned_vector_strategy() -> impl Strategy<Value = Vec<f32>> {
    (
        prop::collection::vec(-1.0e3f32..1.0e3, 1..256),
        prop_oneof![Just(f32::NAN), Just(f32::INFINITY), Just(f32::NEG_INFINITY)],
        any::<prop::sample::Index>(),
    )
        .prop_map(|(mut v, poison, at)| {
            let i = at.index(v.len());
            v[i] = poison;
            v
        })
}

/// Strategy for per-timestep arg-max classes in `0..width`
pub fn class_sequence_strategy(width: usize, max_len: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0..width, 0..max_len)
}

/// Insert blanks at the given positions, skipping any position that would
/// split a run of one repeated non-blank class
#[must_use]
pub fn insert_safe_blanks(classes: &[usize], positions: &[usize]) -> Vec<usize> {
    let mut sorted: Vec<usize> = positions
        .iter()
        .copied()
        .filter(|&p| p <= classes.len())
        .filter(|&p| {
            p == 0
                || p == classes.len()
                || classes[p - 1] != classes[p]
                || classes[p - 1] == BLANK_INDEX
        })
        .collect();
    sorted.sort_unstable_by(|a, b| b.cmp(a));

    let mut out = classes.to_vec();
    for p in sorted {
        out.insert(p, BLANK_INDEX);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_safe_blanks_skips_run_split() {
        // Position 1 splits the run [3, 3]
        assert_eq!(insert_safe_blanks(&[3, 3], &[1]), vec![3, 3]);
    }

    #[test]
    fn test_insert_safe_blanks_edges() {
        assert_eq!(insert_safe_blanks(&[1, 2], &[0, 1, 2]), vec![0, 1, 0, 2, 0]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_score_vectors_not_uniform(v in score_vector_strategy()) {
            prop_assert!(v.iter().copied().fold(f32::NEG_INFINITY, f32::max) >= 0.01);
        }

        #[test]
        fn prop_logit_vectors_exceed_threshold(v in logit_vector_strategy()) {
            prop_assert!(v.iter().copied().fold(f32::NEG_INFINITY, f32::max) > 10.0);
        }

        #[test]
        fn prop_poisoned_vectors_not_finite(v in poisoned_vector_strategy()) {
            prop_assert!(v.iter().any(|x| !x.is_finite()));
        }
    }
}
