//! NPU QA Decode
//!
//! Numeric core of the NPU inference qualification harness: turns a raw
//! output tensor into something a verdict can be based on.
//!
//! Pipeline for one output tensor:
//!
//! 1. [`validate`] rejects NaN/Inf and degenerate (all-zero) output
//! 2. [`quant`] rescales integer-quantized output and softmaxes raw logits
//! 3. [`classify`] ranks the scores into top-K predictions, or
//!    [`ctc`] greedy-decodes a per-timestep distribution into text
//!
//! [`stats`] carries the latency summary and the rounding used in reports.

#![warn(missing_docs)]
// Allow common patterns
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::doc_markdown)]
// Allow common patterns in test code
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::float_cmp))]

pub mod classify;
pub mod ctc;
pub mod error;
#[cfg(any(test, feature = "proptest"))]
pub mod proptest_impl;
pub mod quant;
pub mod stats;
pub mod validate;

pub use classify::{DEFAULT_TOP_K, Prediction, top_k};
pub use ctc::{BLANK_INDEX, CtcDecoder, Vocabulary};
pub use error::{Error, Result};
pub use quant::{DEFAULT_LOGIT_THRESHOLD, Normalized, Normalizer, QuantParams, softmax};
pub use stats::{LatencySummary, round_to};
pub use validate::{DEFAULT_UNIFORM_THRESHOLD, OutputValidator, TensorValidity};
