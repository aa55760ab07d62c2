//! Numerical sanity checks on raw inference output
//!
//! Two gates, always in this order:
//!
//! 1. every element must be finite
//! 2. the maximum element must reach the uniformity threshold

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Maximum below which an output is considered uniform/zero
pub const DEFAULT_UNIFORM_THRESHOLD: f32 = 0.001;

/// Element-level census of an output tensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorValidity {
    /// NaN elements
    pub nan_count: usize,
    /// +/-Inf elements
    pub inf_count: usize,
    /// Exactly-zero elements
    pub zero_count: usize,
    /// Total elements
    pub total: usize,
    /// Largest finite element (`None` when no finite element exists)
    pub max: Option<f32>,
}

impl TensorValidity {
    /// True when no NaN or Inf was seen
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.nan_count == 0 && self.inf_count == 0
    }
}

/// Validator for flattened output tensors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputValidator {
    uniform_threshold: f32,
}

impl Default for OutputValidator {
    fn default() -> Self {
        Self::new(DEFAULT_UNIFORM_THRESHOLD)
    }
}

impl OutputValidator {
    /// Create a validator with a custom uniformity threshold
    #[must_use]
    pub fn new(uniform_threshold: f32) -> Self {
        Self { uniform_threshold }
    }

    /// Configured uniformity threshold
    #[must_use]
    pub fn uniform_threshold(&self) -> f32 {
        self.uniform_threshold
    }

    /// Count NaN, Inf and zero elements and track the finite maximum
    #[must_use]
    pub fn inspect(&self, values: &[f32]) -> TensorValidity {
        let mut nan_count = 0;
        let mut inf_count = 0;
        let mut zero_count = 0;
        let mut max: Option<f32> = None;

        for &v in values {
            if v.is_nan() {
                nan_count += 1;
            } else if v.is_infinite() {
                inf_count += 1;
            } else {
                if v == 0.0 {
                    zero_count += 1;
                }
                max = Some(max.map_or(v, |m| m.max(v)));
            }
        }

        TensorValidity {
            nan_count,
            inf_count,
            zero_count,
            total: values.len(),
            max,
        }
    }

    /// Reject any tensor containing NaN or Inf
    ///
    /// # Errors
    ///
    /// Returns [`Error::NonFinite`] if any element is not finite.
    pub fn check_finite(&self, values: &[f32]) -> Result<TensorValidity> {
        let validity = self.inspect(values);
        if validity.is_finite() {
            Ok(validity)
        } else {
            Err(Error::NonFinite {
                nan_count: validity.nan_count,
                inf_count: validity.inf_count,
            })
        }
    }

    /// Reject a tensor whose maximum is below the uniformity threshold
    ///
    /// Expects finite input; call [`Self::check_finite`] first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyOutput`] for an empty tensor and
    /// [`Error::Degenerate`] when the maximum is below the threshold.
    pub fn check_non_degenerate(&self, values: &[f32]) -> Result<f32> {
        let max = values
            .iter()
            .copied()
            .reduce(f32::max)
            .ok_or(Error::EmptyOutput)?;

        if max < self.uniform_threshold {
            return Err(Error::Degenerate {
                max,
                threshold: self.uniform_threshold,
            });
        }
        Ok(max)
    }

    /// Run both gates in order
    ///
    /// # Errors
    ///
    /// Returns the first gate failure.
    pub fn validate(&self, values: &[f32]) -> Result<TensorValidity> {
        let validity = self.check_finite(values)?;
        self.check_non_degenerate(values)?;
        Ok(validity)
    }
}
