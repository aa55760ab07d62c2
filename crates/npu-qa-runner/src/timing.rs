//! Timed execution
//!
//! One untimed warm-up pass absorbs first-run costs (lazy allocation, cache
//! fill, graph compilation); then `repeat` passes are each timed with a
//! monotonic clock. The output of the last timed pass is kept for scoring.

use crate::engine::{EngineError, InferenceEngine, InputTensor, OutputTensor};
use crate::error::{EngineFailure, Error};
use npu_qa_decode::LatencySummary;
use std::time::Instant;
use tracing::debug;

/// Successful timed run
#[derive(Debug, Clone, PartialEq)]
pub struct TimedRun {
    /// Per-pass latency in milliseconds
    pub samples_ms: Vec<f64>,
    /// Outputs of the last timed pass
    pub outputs: Vec<OutputTensor>,
}

impl TimedRun {
    /// Average/minimum latency
    #[must_use]
    pub fn summary(&self) -> Option<LatencySummary> {
        LatencySummary::from_samples(&self.samples_ms)
    }
}

/// Failed timed run; samples of passes completed before the failure
#[derive(Debug, Clone, PartialEq)]
pub struct TimingFailure {
    /// Which invocation failed
    pub failure: EngineFailure,
    /// Latency of the passes that completed
    pub samples_ms: Vec<f64>,
}

impl TimingFailure {
    /// Average/minimum latency of the completed passes
    #[must_use]
    pub fn summary(&self) -> Option<LatencySummary> {
        LatencySummary::from_samples(&self.samples_ms)
    }
}

impl From<TimingFailure> for Error {
    fn from(failure: TimingFailure) -> Self {
        Self::Engine(failure.failure)
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Warm up once, then time `repeat` invocations
///
/// # Errors
///
/// Returns a [`TimingFailure`] on the first failing invocation; any failure
/// is fatal for the run.
pub fn run_timed(
    engine: &mut dyn InferenceEngine,
    input: &InputTensor,
    repeat: usize,
) -> Result<TimedRun, TimingFailure> {
    let fail = |wrap: fn(EngineError) -> EngineFailure, e: EngineError, samples_ms: Vec<f64>| {
        TimingFailure {
            failure: wrap(e),
            samples_ms,
        }
    };

    let start = Instant::now();
    let mut outputs = engine
        .invoke(input)
        .map_err(|e| fail(EngineFailure::WarmUp, e, Vec::new()))?;
    debug!(warmup_ms = elapsed_ms(start), "warm-up complete");

    let mut samples_ms = Vec::with_capacity(repeat);
    for _ in 0..repeat {
        let start = Instant::now();
        match engine.invoke(input) {
            Ok(out) => {
                samples_ms.push(elapsed_ms(start));
                outputs = out;
            }
            Err(e) => return Err(fail(EngineFailure::Invoke, e, samples_ms)),
        }
    }

    Ok(TimedRun {
        samples_ms,
        outputs,
    })
}
