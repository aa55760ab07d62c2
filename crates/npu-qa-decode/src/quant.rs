//! Quantization normalizer
//!
//! Classification heads may emit integer-quantized scores, raw logits or
//! already-bounded probabilities depending on how the model was exported.
//! [`Normalizer`] brings all three onto a common real-valued scale:
//!
//! - quantized output is rescaled with `real = (stored - zero_point) * scale`
//! - a vector whose maximum exceeds the logit threshold is softmaxed
//!
//! Dequantization always happens before the logit heuristic.

use serde::{Deserialize, Serialize};

/// Maximum above which a score vector is treated as unnormalized logits
pub const DEFAULT_LOGIT_THRESHOLD: f32 = 10.0;

/// Per-tensor affine quantization parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantParams {
    /// Scale factor
    pub scale: f32,
    /// Stored value that maps to real zero
    pub zero_point: i32,
}

impl QuantParams {
    /// Create quantization parameters
    #[must_use]
    pub fn new(scale: f32, zero_point: i32) -> Self {
        Self { scale, zero_point }
    }

    /// A zero (or non-finite) scale means the tensor is not quantized
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.scale != 0.0 && self.scale.is_finite()
    }

    /// Map one stored value to its real value
    #[must_use]
    pub fn dequantize(&self, stored: f32) -> f32 {
        (stored - self.zero_point as f32) * self.scale
    }
}

/// Numerically stable softmax
///
/// Subtracts the maximum before exponentiating; accumulates in f64.
#[must_use]
pub fn softmax(values: &[f32]) -> Vec<f32> {
    let Some(max) = values.iter().copied().reduce(f32::max) else {
        return Vec::new();
    };

    let exps: Vec<f64> = values
        .iter()
        .map(|&v| (f64::from(v) - f64::from(max)).exp())
        .collect();
    let sum: f64 = exps.iter().sum();

    exps.iter().map(|&e| (e / sum) as f32).collect()
}

/// Result of normalization
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// Real-valued scores
    pub scores: Vec<f32>,
    /// Quantization parameters were applied
    pub dequantized: bool,
    /// Softmax was applied
    pub softmax_applied: bool,
}

/// Rescales quantized output and softmaxes logits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    logit_threshold: f32,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_LOGIT_THRESHOLD)
    }
}

impl Normalizer {
    /// Create a normalizer with a custom logit threshold
    #[must_use]
    pub fn new(logit_threshold: f32) -> Self {
        Self { logit_threshold }
    }

    /// Configured logit threshold
    #[must_use]
    pub fn logit_threshold(&self) -> f32 {
        self.logit_threshold
    }

    /// Normalize a flattened output vector
    #[must_use]
    pub fn normalize(&self, raw: &[f32], quant: Option<QuantParams>) -> Normalized {
        let (mut scores, dequantized) = match quant {
            Some(params) if params.is_active() => (
                raw.iter().map(|&v| params.dequantize(v)).collect::<Vec<_>>(),
                true,
            ),
            _ => (raw.to_vec(), false),
        };

        let looks_like_logits = scores
            .iter()
            .copied()
            .reduce(f32::max)
            .is_some_and(|max| max > self.logit_threshold);

        if looks_like_logits {
            scores = softmax(&scores);
        }

        Normalized {
            scores,
            dequantized,
            softmax_applied: looks_like_logits,
        }
    }
}
