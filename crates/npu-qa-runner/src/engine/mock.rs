//! Scriptable runtime for tests
//!
//! [`MockRuntime`] hands out [`MockEngine`] handles that replay canned
//! outputs and fail at configured points. A shared [`MockProbe`] counts
//! every lifecycle call so tests can assert that handles are released on
//! all exit paths.

use super::{EngineError, InferenceEngine, InputTensor, OutputTensor, Runtime};
use crate::backend::Backend;
use crate::config::CoreMask;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Lifecycle call counters shared between a runtime and its engines
#[derive(Debug, Clone, Default)]
pub struct MockProbe {
    counts: Arc<Counts>,
}

#[derive(Debug, Default)]
struct Counts {
    engines: AtomicUsize,
    loads: AtomicUsize,
    inits: AtomicUsize,
    invokes: AtomicUsize,
    releases: AtomicUsize,
    delegate_loads: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

impl MockProbe {
    /// Engine handles created
    #[must_use]
    pub fn engines_created(&self) -> usize {
        self.counts.engines.load(Ordering::SeqCst)
    }

    /// `load` calls
    #[must_use]
    pub fn loads(&self) -> usize {
        self.counts.loads.load(Ordering::SeqCst)
    }

    /// `initialize_runtime` calls
    #[must_use]
    pub fn inits(&self) -> usize {
        self.counts.inits.load(Ordering::SeqCst)
    }

    /// `invoke` calls, warm-up included
    #[must_use]
    pub fn invokes(&self) -> usize {
        self.counts.invokes.load(Ordering::SeqCst)
    }

    /// Handles actually released
    #[must_use]
    pub fn releases(&self) -> usize {
        self.counts.releases.load(Ordering::SeqCst)
    }

    /// Delegate load attempts
    #[must_use]
    pub fn delegate_loads(&self) -> usize {
        self.counts.delegate_loads.load(Ordering::SeqCst)
    }
}

/// How the mock treats delegate plugins
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegateBehavior {
    /// Plugin loads and accelerates
    Load,
    /// Plugin fails to load with this message
    Fail(String),
}

/// Delegate handed out by [`MockRuntime`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDelegate {
    /// Path the plugin was loaded from
    pub path: PathBuf,
}

/// Scriptable [`Runtime`]
#[derive(Debug, Clone)]
pub struct MockRuntime {
    native_backend: Option<Backend>,
    delegate: DelegateBehavior,
    model_outputs: HashMap<String, Vec<OutputTensor>>,
    default_outputs: Vec<OutputTensor>,
    load_status: i32,
    init_status: i32,
    fail_invoke_at: Option<usize>,
    probe: MockProbe,
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self {
            native_backend: None,
            delegate: DelegateBehavior::Load,
            model_outputs: HashMap::new(),
            default_outputs: vec![OutputTensor::new(
                vec![1, 5],
                vec![0.1, 12.0, 0.3, 0.2, 11.5],
            )],
            load_status: 0,
            init_status: 0,
            fail_invoke_at: None,
            probe: MockProbe::default(),
        }
    }
}

impl MockRuntime {
    /// Create a CPU runtime that accelerates through any delegate it is given
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Behave like a vendor runtime that always executes on the accelerator
    #[must_use]
    pub fn native_accelerator(mut self) -> Self {
        self.native_backend = Some(Backend::Accelerator);
        self
    }

    /// Make delegate loading fail
    #[must_use]
    pub fn with_delegate_failure(mut self, message: impl Into<String>) -> Self {
        self.delegate = DelegateBehavior::Fail(message.into());
        self
    }

    /// Outputs returned for every model without a specific entry
    #[must_use]
    pub fn with_outputs(mut self, outputs: Vec<OutputTensor>) -> Self {
        self.default_outputs = outputs;
        self
    }

    /// Outputs returned for the model with this file name
    #[must_use]
    pub fn with_model_outputs(
        mut self,
        file_name: impl Into<String>,
        outputs: Vec<OutputTensor>,
    ) -> Self {
        self.model_outputs.insert(file_name.into(), outputs);
        self
    }

    /// Status code returned by `load`
    #[must_use]
    pub fn with_load_status(mut self, code: i32) -> Self {
        self.load_status = code;
        self
    }

    /// Status code returned by `initialize_runtime`
    #[must_use]
    pub fn with_init_status(mut self, code: i32) -> Self {
        self.init_status = code;
        self
    }

    /// Fail the n-th invocation of each engine (0 is the warm-up)
    #[must_use]
    pub fn with_invoke_failure_at(mut self, invocation: usize) -> Self {
        self.fail_invoke_at = Some(invocation);
        self
    }

    /// Shared lifecycle counters
    #[must_use]
    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }
}

fn describe_mock_status(_code: i32) -> &'static str {
    "mock status"
}

impl Runtime for MockRuntime {
    type Delegate = MockDelegate;

    fn name(&self) -> &'static str {
        "mock"
    }

    fn native_backend(&self) -> Option<Backend> {
        self.native_backend
    }

    fn load_delegate(&self, path: &Path) -> Result<Self::Delegate, EngineError> {
        bump(&self.probe.counts.delegate_loads);
        match &self.delegate {
            DelegateBehavior::Load => Ok(MockDelegate {
                path: path.to_path_buf(),
            }),
            DelegateBehavior::Fail(message) => Err(EngineError::fault(message.clone())),
        }
    }

    fn create_engine(&self, delegate: Option<Self::Delegate>) -> Box<dyn InferenceEngine> {
        bump(&self.probe.counts.engines);
        let backend = self.native_backend.unwrap_or(if delegate.is_some() {
            Backend::Accelerator
        } else {
            Backend::Cpu
        });
        Box::new(MockEngine {
            backend,
            runtime: self.clone(),
            outputs: None,
            invocations: 0,
            released: false,
        })
    }
}

/// Engine handle created by [`MockRuntime`]
#[derive(Debug)]
pub struct MockEngine {
    backend: Backend,
    runtime: MockRuntime,
    outputs: Option<Vec<OutputTensor>>,
    invocations: usize,
    released: bool,
}

impl InferenceEngine for MockEngine {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn load(&mut self, model_path: &Path) -> Result<(), EngineError> {
        bump(&self.runtime.probe.counts.loads);
        super::check_status(self.runtime.load_status, describe_mock_status)?;
        let key = model_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let outputs = self
            .runtime
            .model_outputs
            .get(&key)
            .unwrap_or(&self.runtime.default_outputs);
        self.outputs = Some(outputs.clone());
        Ok(())
    }

    fn initialize_runtime(&mut self, _core_mask: CoreMask) -> Result<(), EngineError> {
        bump(&self.runtime.probe.counts.inits);
        super::check_status(self.runtime.init_status, describe_mock_status)
    }

    fn invoke(&mut self, input: &InputTensor) -> Result<Vec<OutputTensor>, EngineError> {
        bump(&self.runtime.probe.counts.invokes);
        let invocation = self.invocations;
        self.invocations += 1;

        if self.runtime.fail_invoke_at == Some(invocation) {
            return Err(EngineError::status(-1, "mock invoke failure"));
        }
        if input.data.len() != input.element_count() {
            return Err(EngineError::fault(format!(
                "input holds {} bytes, shape {:?} needs {}",
                input.data.len(),
                input.shape,
                input.element_count()
            )));
        }
        self.outputs
            .clone()
            .ok_or_else(|| EngineError::fault("invoke before load"))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            bump(&self.runtime.probe.counts.releases);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> InputTensor {
        InputTensor::new(vec![1, 2, 2, 3], vec![0; 12])
    }

    #[test]
    fn test_default_outputs_after_load() {
        let runtime = MockRuntime::new();
        let mut engine = runtime.create_engine(None);
        engine.load(Path::new("/m/mobilenet_v1.rknn")).expect("load");
        let outputs = engine.invoke(&input()).expect("invoke");
        assert_eq!(outputs[0].data, vec![0.1, 12.0, 0.3, 0.2, 11.5]);
    }

    #[test]
    fn test_model_specific_outputs() {
        let runtime = MockRuntime::new()
            .with_model_outputs("ocr.rknn", vec![OutputTensor::new(vec![1], vec![7.0])]);
        let mut engine = runtime.create_engine(None);
        engine.load(Path::new("/models/ocr.rknn")).expect("load");
        assert_eq!(engine.invoke(&input()).expect("invoke")[0].data, vec![7.0]);
    }

    #[test]
    fn test_backend_follows_delegate() {
        let runtime = MockRuntime::new();
        assert_eq!(runtime.create_engine(None).backend(), Backend::Cpu);
        let delegate = runtime.load_delegate(Path::new("/lib/d.so")).expect("delegate");
        assert_eq!(
            runtime.create_engine(Some(delegate)).backend(),
            Backend::Accelerator
        );
        let native = MockRuntime::new().native_accelerator();
        assert_eq!(native.create_engine(None).backend(), Backend::Accelerator);
    }

    #[test]
    fn test_invoke_failure_at() {
        let runtime = MockRuntime::new().with_invoke_failure_at(2);
        let mut engine = runtime.create_engine(None);
        engine.load(Path::new("m.rknn")).expect("load");
        assert!(engine.invoke(&input()).is_ok());
        assert!(engine.invoke(&input()).is_ok());
        assert!(engine.invoke(&input()).is_err());
        assert_eq!(runtime.probe().invokes(), 3);
    }

    #[test]
    fn test_input_size_checked() {
        let runtime = MockRuntime::new();
        let mut engine = runtime.create_engine(None);
        engine.load(Path::new("m.rknn")).expect("load");
        let bad = InputTensor::new(vec![1, 2, 2, 3], vec![0; 5]);
        assert!(matches!(engine.invoke(&bad), Err(EngineError::Fault(_))));
    }

    #[test]
    fn test_release_idempotent() {
        let runtime = MockRuntime::new();
        let mut engine = runtime.create_engine(None);
        engine.release();
        engine.release();
        assert_eq!(runtime.probe().releases(), 1);
    }

    #[test]
    fn test_status_failures() {
        let runtime = MockRuntime::new().with_load_status(-6).with_init_status(-3);
        let mut engine = runtime.create_engine(None);
        assert_eq!(
            engine.load(Path::new("m.rknn")),
            Err(EngineError::status(-6, "mock status"))
        );
        assert_eq!(
            engine.initialize_runtime(CoreMask::Auto),
            Err(EngineError::status(-3, "mock status"))
        );
    }

    #[test]
    fn test_delegate_failure() {
        let runtime = MockRuntime::new().with_delegate_failure("bad plugin");
        let err = runtime.load_delegate(Path::new("/lib/d.so")).unwrap_err();
        assert_eq!(err.to_string(), "bad plugin");
        assert_eq!(runtime.probe().delegate_loads(), 1);
    }
}
