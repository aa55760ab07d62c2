//! Error types for npu-qa-decode

use thiserror::Error;

/// Result type alias for decode operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while validating or decoding an output tensor
#[derive(Debug, Error)]
pub enum Error {
    /// At least one element is NaN or infinite
    #[error("NaN/Inf in output")]
    NonFinite {
        /// Number of NaN elements
        nan_count: usize,
        /// Number of +/-Inf elements
        inf_count: usize,
    },

    /// Maximum element is below the uniformity threshold
    #[error("Output appears uniform/zero")]
    Degenerate {
        /// Observed maximum
        max: f32,
        /// Threshold it was compared against
        threshold: f32,
    },

    /// Tensor has no elements
    #[error("Output tensor is empty")]
    EmptyOutput,

    /// Tensor rank is not supported by the decoder
    #[error("Unsupported output shape {shape:?}")]
    InvalidShape {
        /// Offending shape
        shape: Vec<usize>,
    },

    /// Element count disagrees with the declared shape
    #[error("Output shape {shape:?} expects {expected} elements, got {actual}")]
    ShapeMismatch {
        /// Declared shape
        shape: Vec<usize>,
        /// Product of the shape
        expected: usize,
        /// Actual element count
        actual: usize,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
