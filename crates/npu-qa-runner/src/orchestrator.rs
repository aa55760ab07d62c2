//! Test orchestration
//!
//! Runs each case through resolve → load → init → warm-up → timed passes →
//! validate → decode, and turns whatever happens into a [`Verdict`]. Errors
//! never cross the case boundary.

use crate::backend::{
    Backend, BackendSelection, DelegateOutcome, DelegateResolver, Resolution, resolve_backend,
};
use crate::case::{DecodeMode, InputRecipe, TestCase};
use crate::config::{HarnessConfig, Stack};
use crate::engine::rknn::RknnRuntime;
use crate::engine::tflite::TfliteRuntime;
use crate::engine::{InputTensor, OutputTensor, Runtime, RuntimeGuard};
use crate::error::{EngineFailure, Error, Result};
use crate::preprocess::{load_text_image, synthetic_input};
use crate::timing::run_timed;
use crate::verdict::{Details, RunReport, TestReport, Verdict};
use npu_qa_decode::{CtcDecoder, Normalizer, OutputValidator, Vocabulary, top_k};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, info_span, warn};

/// Runs test cases against one runtime
#[derive(Debug)]
pub struct Harness<R: Runtime> {
    config: HarnessConfig,
    runtime: R,
    validator: OutputValidator,
    normalizer: Normalizer,
    resolver: Option<DelegateResolver>,
}

impl<R: Runtime> Harness<R> {
    /// Create a harness
    #[must_use]
    pub fn new(config: HarnessConfig, runtime: R) -> Self {
        Self {
            validator: OutputValidator::new(config.uniform_threshold),
            normalizer: Normalizer::new(config.logit_threshold),
            resolver: DelegateResolver::from_config(&config.delegate),
            config,
            runtime,
        }
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run every configured case
    #[must_use]
    pub fn run(&self) -> RunReport {
        let mut report = TestReport::new(self.config.classification.name.clone());
        for case in TestCase::from_config(&self.config) {
            let verdict = self.run_case(&case);
            report.insert(case.name, verdict);
        }
        RunReport::Tests(report)
    }

    /// Run one case to a verdict
    #[must_use]
    pub fn run_case(&self, case: &TestCase) -> Verdict {
        let _span = info_span!("case", name = %case.name).entered();
        info!(model = %case.model_path.display(), "starting case");

        let mut details = Details::default();
        let verdict = match self.execute(case, &mut details) {
            Ok(()) => Verdict::pass(details),
            Err(e) => Verdict::from_error(&e, details),
        };

        match &verdict.error {
            None => info!(status = ?verdict.status, "case finished"),
            Some(reason) => warn!(status = ?verdict.status, %reason, "case finished"),
        }
        verdict
    }

    fn execute(&self, case: &TestCase, details: &mut Details) -> Result<()> {
        if let Some((role, path)) = case
            .required_artifacts()
            .into_iter()
            .find(|(_, path)| !path.exists())
        {
            return Err(Error::Unavailable(format!(
                "{role} not found at {}",
                path.display()
            )));
        }

        let vocabulary = match &case.mode {
            DecodeMode::SequenceRecognition { dictionary, .. } => {
                Some(Vocabulary::from_file(dictionary)?)
            }
            DecodeMode::Classification { .. } => None,
        };
        let input = build_input(&case.input)?;

        let Resolution { selection, delegate } =
            resolve_backend(&self.runtime, self.resolver.as_ref());
        info!(backend = %describe_selection(&selection), "backend resolved");
        details.record_backend(&selection);

        let mut engine = RuntimeGuard::new(self.runtime.create_engine(delegate));
        engine
            .load(&case.model_path)
            .map_err(EngineFailure::Load)?;
        engine
            .initialize_runtime(self.config.core_mask)
            .map_err(EngineFailure::Initialize)?;

        let run = match run_timed(&mut *engine, &input, self.config.repeat_count) {
            Ok(run) => run,
            Err(failure) => {
                details.record_latency(failure.summary());
                return Err(failure.into());
            }
        };
        engine.finish();

        let summary = run.summary();
        if let Some(s) = &summary {
            info!(average_ms = s.average_ms, min_ms = s.min_ms, passes = s.passes, "latency");
        }
        details.record_latency(summary);

        let output = run
            .outputs
            .into_iter()
            .next()
            .ok_or(EngineFailure::NoOutput)?;
        details.output_shape = Some(output.shape.clone());

        match (&case.mode, vocabulary) {
            (DecodeMode::SequenceRecognition { expected_text, .. }, Some(vocabulary)) => {
                self.score_recognition(&output, vocabulary, expected_text.as_deref(), details)
            }
            (DecodeMode::Classification { top_k }, _) => {
                self.score_classification(&output, *top_k, details)
            }
            (DecodeMode::SequenceRecognition { .. }, None) => Err(Error::Config(
                "recognition case without a dictionary".to_string(),
            )),
        }
    }

    fn score_classification(
        &self,
        output: &OutputTensor,
        k: usize,
        details: &mut Details,
    ) -> Result<()> {
        self.validator.check_finite(&output.data)?;
        let normalized = self.normalizer.normalize(&output.data, output.quant);
        details.top5 = Some(top_k(&normalized.scores, k));
        self.validator.check_non_degenerate(&normalized.scores)?;
        Ok(())
    }

    fn score_recognition(
        &self,
        output: &OutputTensor,
        vocabulary: Vocabulary,
        expected: Option<&str>,
        details: &mut Details,
    ) -> Result<()> {
        let values = match output.quant {
            Some(params) if params.is_active() => {
                output.data.iter().map(|&v| params.dequantize(v)).collect()
            }
            _ => output.data.clone(),
        };
        self.validator.validate(&values)?;

        let recognized = CtcDecoder::new(vocabulary).decode(&values, &output.shape)?;
        info!(%recognized, "decoded text");
        details.recognized = Some(recognized.clone());

        let Some(expected) = expected else {
            return Ok(());
        };
        let matched = recognized.trim() == expected.trim();
        details.expected = Some(expected.to_string());
        details.matched = Some(matched);
        if matched {
            Ok(())
        } else {
            Err(Error::SemanticMismatch {
                expected: expected.to_string(),
                recognized,
            })
        }
    }
}

fn build_input(recipe: &InputRecipe) -> Result<InputTensor> {
    match recipe {
        InputRecipe::Synthetic { shape, seed } => Ok(synthetic_input(shape, *seed)),
        InputRecipe::Image {
            path,
            height,
            width,
        } => load_text_image(path, *height, *width),
    }
}

/// Open the configured runtime and run every case
///
/// A missing runtime library degrades the whole run to a single top-level
/// SKIP.
#[must_use]
pub fn run_stack(config: HarnessConfig) -> RunReport {
    info!(stack = %config.stack, library = %config.runtime_library.display(), "opening runtime");
    match config.stack {
        Stack::Rknpu => match RknnRuntime::open(&config.runtime_library) {
            Ok(runtime) => Harness::new(config, runtime).run(),
            Err(e) => RunReport::aborted(&e),
        },
        Stack::Teflon => match TfliteRuntime::open(&config.runtime_library) {
            Ok(runtime) => Harness::new(config, runtime).run(),
            Err(e) => RunReport::aborted(&e),
        },
    }
}

/// Environment report produced without running inference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    /// Runtime stack
    pub stack: Stack,
    /// Runtime library path or name
    pub runtime_library: PathBuf,
    /// Library opened and exposes the expected symbols
    pub runtime_available: bool,
    /// Why the library could not be opened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_error: Option<String>,
    /// Backend the next case would run on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<BackendSelection>,
    /// Models directory exists
    pub models_dir_present: bool,
}

/// Resolve runtime and backend without running inference
#[must_use]
pub fn probe_stack(config: &HarnessConfig) -> ProbeReport {
    let resolver = DelegateResolver::from_config(&config.delegate);
    let opened = match config.stack {
        Stack::Rknpu => RknnRuntime::open(&config.runtime_library)
            .map(|rt| resolve_backend(&rt, resolver.as_ref()).selection),
        Stack::Teflon => TfliteRuntime::open(&config.runtime_library)
            .map(|rt| resolve_backend(&rt, resolver.as_ref()).selection),
    };

    let (selection, runtime_error) = match opened {
        Ok(selection) => (Some(selection), None),
        Err(e) => (None, Some(e.to_string())),
    };
    ProbeReport {
        stack: config.stack,
        runtime_library: config.runtime_library.clone(),
        runtime_available: runtime_error.is_none(),
        runtime_error,
        selection,
        models_dir_present: config.models_dir.is_dir(),
    }
}

/// One-line description of a backend selection
#[must_use]
pub fn describe_selection(selection: &BackendSelection) -> String {
    match &selection.delegate {
        DelegateOutcome::Native => format!("{} (native)", selection.backend),
        DelegateOutcome::Disabled => format!("{} (delegate disabled)", Backend::Cpu),
        DelegateOutcome::NotFound => format!("{} (no delegate found)", Backend::Cpu),
        DelegateOutcome::Loaded { path } => {
            format!("{} via {}", selection.backend, path.display())
        }
        DelegateOutcome::Failed { path, reason } => {
            format!("{} ({} failed: {reason})", Backend::Cpu, path.display())
        }
    }
}
