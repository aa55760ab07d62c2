//! NPU QA Runner
//!
//! Qualification harness for on-board neural accelerators: runs a small set
//! of known models through the vendor inference runtime, times them, checks
//! the outputs are sane, and reports one verdict per test case.
//!
//! Per case: [`backend`] resolution → [`engine`] load/init → [`timing`]
//! warm-up and timed passes → output validation and decoding
//! (`npu_qa_decode`) → [`verdict`]. [`orchestrator`] ties these together.

#![warn(missing_docs)]
// Allow common patterns
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]
// Allow common patterns in test code
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::float_cmp))]
#![cfg_attr(test, allow(clippy::field_reassign_with_default))]

pub mod backend;
pub mod case;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod preprocess;
pub mod timing;
pub mod verdict;

#[cfg(test)]
pub mod test_fixtures;

pub use backend::{
    Backend, BackendSelection, DelegateOutcome, DelegateResolver, Resolution, resolve_backend,
};
pub use case::{DecodeMode, InputRecipe, TestCase};
pub use config::{
    ClassificationCase, CoreMask, DelegateConfig, HarnessConfig, RecognitionCase, Stack,
};
pub use engine::mock::{MockEngine, MockProbe, MockRuntime};
pub use engine::{EngineError, InferenceEngine, InputTensor, OutputTensor, Runtime, RuntimeGuard};
pub use error::{EngineFailure, Error, Result};
pub use orchestrator::{Harness, ProbeReport, probe_stack, run_stack};
pub use timing::{TimedRun, TimingFailure, run_timed};
pub use verdict::{Details, RunReport, Status, TestReport, Verdict};
