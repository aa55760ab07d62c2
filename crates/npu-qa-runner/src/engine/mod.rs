//! Inference engine capability interface
//!
//! The harness talks to a vendor runtime through two traits:
//!
//! - [`Runtime`] is the loaded vendor library. It creates engine handles and,
//!   for stacks that accelerate through an external plugin, loads delegates.
//! - [`InferenceEngine`] is one handle: load a model, initialize the device,
//!   invoke, release.
//!
//! Real adapters live in [`rknn`] and [`tflite`]; [`mock`] provides a
//! scriptable stand-in used by tests.

mod guard;
pub mod mock;
pub mod rknn;
pub mod tflite;

pub use guard::RuntimeGuard;

use crate::backend::Backend;
use crate::config::CoreMask;
use npu_qa_decode::QuantParams;
use std::path::Path;
use thiserror::Error;

/// Error reported by an engine operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Non-zero status code returned by the vendor library
    #[error("ret={code}, {description}")]
    Status {
        /// Raw status code
        code: i32,
        /// Human-readable meaning of the code
        description: String,
    },

    /// Failure without a status code (null handle, bad tensor metadata)
    #[error("{0}")]
    Fault(String),
}

impl EngineError {
    /// Create a status error
    #[must_use]
    pub fn status(code: i32, description: impl Into<String>) -> Self {
        Self::Status {
            code,
            description: description.into(),
        }
    }

    /// Create a fault error
    #[must_use]
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault(message.into())
    }
}

/// Map a vendor status code to `Ok` (zero) or a described [`EngineError`]
///
/// # Errors
///
/// Returns [`EngineError::Status`] for any non-zero code.
pub fn check_status(code: i32, describe: fn(i32) -> &'static str) -> Result<(), EngineError> {
    if code == 0 {
        Ok(())
    } else {
        Err(EngineError::status(code, describe(code)))
    }
}

/// Input tensor handed to an engine: raw bytes plus logical shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputTensor {
    /// Logical shape (NHWC or HWC)
    pub shape: Vec<usize>,
    /// Row-major element bytes
    pub data: Vec<u8>,
}

impl InputTensor {
    /// Create an input tensor
    #[must_use]
    pub fn new(shape: Vec<usize>, data: Vec<u8>) -> Self {
        Self { shape, data }
    }

    /// Number of elements implied by the shape
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Output tensor returned by an engine
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    /// Logical shape
    pub shape: Vec<usize>,
    /// Element values widened to f32 (still in the stored domain when
    /// `quant` is set)
    pub data: Vec<f32>,
    /// Affine quantization parameters, if the tensor is quantized
    pub quant: Option<QuantParams>,
}

impl OutputTensor {
    /// Create a float output tensor
    #[must_use]
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self {
            shape,
            data,
            quant: None,
        }
    }

    /// Attach quantization parameters
    #[must_use]
    pub fn with_quant(mut self, quant: QuantParams) -> Self {
        self.quant = Some(quant);
        self
    }
}

/// One engine handle
///
/// `release` must be idempotent; it runs once on every exit path through
/// [`RuntimeGuard`], and adapters may also call it from `Drop`.
pub trait InferenceEngine {
    /// Compute backend this handle executes on
    fn backend(&self) -> Backend;

    /// Load a model file
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime rejects the file.
    fn load(&mut self, model_path: &Path) -> Result<(), EngineError>;

    /// Bring up the runtime on the selected compute resources
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be initialized.
    fn initialize_runtime(&mut self, core_mask: CoreMask) -> Result<(), EngineError>;

    /// Run one inference
    ///
    /// # Errors
    ///
    /// Returns an error if the invocation fails.
    fn invoke(&mut self, input: &InputTensor) -> Result<Vec<OutputTensor>, EngineError>;

    /// Free all native resources held by the handle
    fn release(&mut self);
}

/// A loaded vendor runtime library
pub trait Runtime {
    /// Loaded accelerator delegate plugin
    type Delegate;

    /// Short runtime name used in logs
    fn name(&self) -> &'static str;

    /// Backend used without any delegate, when the runtime has a fixed one
    ///
    /// `None` means the runtime executes on CPU unless a delegate is attached.
    fn native_backend(&self) -> Option<Backend>;

    /// Load a delegate plugin
    ///
    /// # Errors
    ///
    /// Returns an error if the plugin cannot be opened or refuses to
    /// create a delegate.
    fn load_delegate(&self, path: &Path) -> Result<Self::Delegate, EngineError>;

    /// Create a fresh engine handle, optionally bound to a delegate
    fn create_engine(&self, delegate: Option<Self::Delegate>) -> Box<dyn InferenceEngine>;
}
