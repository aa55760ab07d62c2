//! TensorFlow Lite runtime adapter with external delegate plugins
//!
//! Binds the TFLite C API (`libtensorflowlite_c.so`) at run time. Without a
//! delegate the interpreter runs on CPU; with a delegate plugin such as the
//! Mesa Teflon driver (`libteflon.so`) supported ops are offloaded to the NPU.
#![allow(unsafe_code)]

use super::{EngineError, InferenceEngine, InputTensor, OutputTensor, Runtime};
use crate::backend::Backend;
use crate::config::CoreMask;
use crate::error::{Error, Result};
use libloading::Library;
use npu_qa_decode::QuantParams;
use std::ffi::{CString, c_char, c_int, c_void};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::Arc;
use tracing::debug;

const TFLITE_FLOAT32: c_int = 1;
const TFLITE_UINT8: c_int = 3;
const TFLITE_INT8: c_int = 9;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct TfLiteQuantizationParams {
    scale: f32,
    zero_point: i32,
}

type ModelCreateFromFileFn = unsafe extern "C" fn(*const c_char) -> *mut c_void;
type ModelDeleteFn = unsafe extern "C" fn(*mut c_void);
type OptionsCreateFn = unsafe extern "C" fn() -> *mut c_void;
type OptionsDeleteFn = unsafe extern "C" fn(*mut c_void);
type OptionsAddDelegateFn = unsafe extern "C" fn(*mut c_void, *mut c_void);
type InterpreterCreateFn = unsafe extern "C" fn(*const c_void, *const c_void) -> *mut c_void;
type InterpreterDeleteFn = unsafe extern "C" fn(*mut c_void);
type AllocateTensorsFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type GetInputTensorFn = unsafe extern "C" fn(*const c_void, i32) -> *mut c_void;
type InvokeFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type GetOutputTensorCountFn = unsafe extern "C" fn(*const c_void) -> i32;
type GetOutputTensorFn = unsafe extern "C" fn(*const c_void, i32) -> *const c_void;
type TensorTypeFn = unsafe extern "C" fn(*const c_void) -> c_int;
type TensorNumDimsFn = unsafe extern "C" fn(*const c_void) -> i32;
type TensorDimFn = unsafe extern "C" fn(*const c_void, i32) -> i32;
type TensorByteSizeFn = unsafe extern "C" fn(*const c_void) -> usize;
type TensorCopyFromBufferFn = unsafe extern "C" fn(*mut c_void, *const c_void, usize) -> c_int;
type TensorCopyToBufferFn = unsafe extern "C" fn(*const c_void, *mut c_void, usize) -> c_int;
type TensorQuantizationParamsFn = unsafe extern "C" fn(*const c_void) -> TfLiteQuantizationParams;

type PluginCreateDelegateFn = unsafe extern "C" fn(
    *mut *mut c_char,
    *mut *mut c_char,
    usize,
    Option<unsafe extern "C" fn(*const c_char)>,
) -> *mut c_void;
type PluginDestroyDelegateFn = unsafe extern "C" fn(*mut c_void);

/// Meaning of a `TfLiteStatus` code
#[must_use]
pub fn describe_status(code: i32) -> &'static str {
    match code {
        0 => "ok",
        1 => "runtime error",
        2 => "delegate error",
        3 => "application error",
        4 => "delegate data not found",
        5 => "delegate data write error",
        6 => "delegate data read error",
        7 => "unresolved ops",
        8 => "cancelled",
        _ => "unknown status",
    }
}

fn symbol<T: Copy>(library: &Library, name: &[u8]) -> std::result::Result<T, libloading::Error> {
    // SAFETY: every call site pairs the symbol name with its c_api.h prototype.
    unsafe { library.get::<T>(name).map(|sym| *sym) }
}

struct TfliteApi {
    model_create_from_file: ModelCreateFromFileFn,
    model_delete: ModelDeleteFn,
    options_create: OptionsCreateFn,
    options_delete: OptionsDeleteFn,
    options_add_delegate: OptionsAddDelegateFn,
    interpreter_create: InterpreterCreateFn,
    interpreter_delete: InterpreterDeleteFn,
    allocate_tensors: AllocateTensorsFn,
    get_input_tensor: GetInputTensorFn,
    invoke: InvokeFn,
    get_output_tensor_count: GetOutputTensorCountFn,
    get_output_tensor: GetOutputTensorFn,
    tensor_type: TensorTypeFn,
    tensor_num_dims: TensorNumDimsFn,
    tensor_dim: TensorDimFn,
    tensor_byte_size: TensorByteSizeFn,
    tensor_copy_from_buffer: TensorCopyFromBufferFn,
    tensor_copy_to_buffer: TensorCopyToBufferFn,
    tensor_quantization_params: TensorQuantizationParamsFn,
    _library: Library,
}

impl TfliteApi {
    fn open(path: &Path) -> std::result::Result<Self, libloading::Error> {
        // SAFETY: the TFLite C library has no load-time preconditions.
        let library = unsafe { Library::new(path) }?;
        Ok(Self {
            model_create_from_file: symbol(&library, b"TfLiteModelCreateFromFile\0")?,
            model_delete: symbol(&library, b"TfLiteModelDelete\0")?,
            options_create: symbol(&library, b"TfLiteInterpreterOptionsCreate\0")?,
            options_delete: symbol(&library, b"TfLiteInterpreterOptionsDelete\0")?,
            options_add_delegate: symbol(&library, b"TfLiteInterpreterOptionsAddDelegate\0")?,
            interpreter_create: symbol(&library, b"TfLiteInterpreterCreate\0")?,
            interpreter_delete: symbol(&library, b"TfLiteInterpreterDelete\0")?,
            allocate_tensors: symbol(&library, b"TfLiteInterpreterAllocateTensors\0")?,
            get_input_tensor: symbol(&library, b"TfLiteInterpreterGetInputTensor\0")?,
            invoke: symbol(&library, b"TfLiteInterpreterInvoke\0")?,
            get_output_tensor_count: symbol(
                &library,
                b"TfLiteInterpreterGetOutputTensorCount\0",
            )?,
            get_output_tensor: symbol(&library, b"TfLiteInterpreterGetOutputTensor\0")?,
            tensor_type: symbol(&library, b"TfLiteTensorType\0")?,
            tensor_num_dims: symbol(&library, b"TfLiteTensorNumDims\0")?,
            tensor_dim: symbol(&library, b"TfLiteTensorDim\0")?,
            tensor_byte_size: symbol(&library, b"TfLiteTensorByteSize\0")?,
            tensor_copy_from_buffer: symbol(&library, b"TfLiteTensorCopyFromBuffer\0")?,
            tensor_copy_to_buffer: symbol(&library, b"TfLiteTensorCopyToBuffer\0")?,
            tensor_quantization_params: symbol(&library, b"TfLiteTensorQuantizationParams\0")?,
            _library: library,
        })
    }
}

/// A delegate created by an external plugin library
///
/// Destroyed through the plugin's own destroy entry point when dropped.
pub struct ExternalDelegate {
    handle: NonNull<c_void>,
    destroy: PluginDestroyDelegateFn,
    path: PathBuf,
    _library: Library,
}

impl ExternalDelegate {
    /// Load a plugin and create a delegate with no options
    ///
    /// # Errors
    ///
    /// Returns an error if the plugin cannot be opened, lacks the plugin
    /// entry points, or returns a null delegate.
    pub fn load(path: &Path) -> std::result::Result<Self, EngineError> {
        let fault = |e: libloading::Error| EngineError::fault(format!("{}: {e}", path.display()));
        // SAFETY: delegate plugins have no load-time preconditions.
        let library = unsafe { Library::new(path) }.map_err(fault)?;
        let create: PluginCreateDelegateFn =
            symbol(&library, b"tflite_plugin_create_delegate\0").map_err(fault)?;
        let destroy: PluginDestroyDelegateFn =
            symbol(&library, b"tflite_plugin_destroy_delegate\0").map_err(fault)?;

        // SAFETY: zero options; the key/value arrays are never read.
        let raw = unsafe { create(std::ptr::null_mut(), std::ptr::null_mut(), 0, None) };
        let handle = NonNull::new(raw).ok_or_else(|| {
            EngineError::fault(format!("{}: plugin returned no delegate", path.display()))
        })?;
        debug!(path = %path.display(), "created external delegate");
        Ok(Self {
            handle,
            destroy,
            path: path.to_path_buf(),
            _library: library,
        })
    }

    /// Plugin path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ExternalDelegate {
    fn drop(&mut self) {
        // SAFETY: handle came from this plugin's create entry point.
        unsafe { (self.destroy)(self.handle.as_ptr()) };
    }
}

/// The TFLite C runtime library
pub struct TfliteRuntime {
    api: Arc<TfliteApi>,
    library: PathBuf,
}

impl TfliteRuntime {
    /// Open the runtime library
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the library or one of its symbols
    /// cannot be loaded.
    pub fn open(library: &Path) -> Result<Self> {
        let api = TfliteApi::open(library).map_err(|e| {
            Error::Unavailable(format!(
                "TFLite runtime not installed ({}): {e}",
                library.display()
            ))
        })?;
        debug!(library = %library.display(), "loaded TFLite runtime");
        Ok(Self {
            api: Arc::new(api),
            library: library.to_path_buf(),
        })
    }

    /// Path the runtime was loaded from
    #[must_use]
    pub fn library(&self) -> &Path {
        &self.library
    }
}

impl Runtime for TfliteRuntime {
    type Delegate = ExternalDelegate;

    fn name(&self) -> &'static str {
        "tflite"
    }

    fn native_backend(&self) -> Option<Backend> {
        None
    }

    fn load_delegate(&self, path: &Path) -> std::result::Result<ExternalDelegate, EngineError> {
        ExternalDelegate::load(path)
    }

    fn create_engine(&self, delegate: Option<ExternalDelegate>) -> Box<dyn InferenceEngine> {
        Box::new(TfliteEngine {
            api: Arc::clone(&self.api),
            model: None,
            options: None,
            interpreter: None,
            delegate,
        })
    }
}

/// One TFLite interpreter
pub struct TfliteEngine {
    api: Arc<TfliteApi>,
    model: Option<NonNull<c_void>>,
    options: Option<NonNull<c_void>>,
    interpreter: Option<NonNull<c_void>>,
    // Declared after the interpreter; `release` destroys it last.
    delegate: Option<ExternalDelegate>,
}

impl TfliteEngine {
    fn check(code: c_int) -> std::result::Result<(), EngineError> {
        super::check_status(code, describe_status)
    }

    fn interpreter(&self) -> std::result::Result<NonNull<c_void>, EngineError> {
        self.interpreter
            .ok_or_else(|| EngineError::fault("interpreter not initialized"))
    }

    fn read_output(&self, tensor: *const c_void) -> std::result::Result<OutputTensor, EngineError> {
        let api = &self.api;
        // SAFETY: tensor is a live output tensor of the current interpreter.
        let (kind, dims, byte_size, quant) = unsafe {
            let dims = (0..(api.tensor_num_dims)(tensor))
                .map(|i| (api.tensor_dim)(tensor, i).max(0) as usize)
                .collect::<Vec<_>>();
            (
                (api.tensor_type)(tensor),
                dims,
                (api.tensor_byte_size)(tensor),
                (api.tensor_quantization_params)(tensor),
            )
        };

        let mut bytes = vec![0u8; byte_size];
        // SAFETY: `bytes` is exactly byte_size long.
        let ret = unsafe {
            (api.tensor_copy_to_buffer)(tensor, bytes.as_mut_ptr().cast(), byte_size)
        };
        Self::check(ret)?;

        let data: Vec<f32> = match kind {
            TFLITE_FLOAT32 => bytes
                .chunks_exact(4)
                .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            TFLITE_UINT8 => bytes.iter().map(|&b| f32::from(b)).collect(),
            TFLITE_INT8 => bytes.iter().map(|&b| f32::from(b as i8)).collect(),
            other => {
                return Err(EngineError::fault(format!(
                    "unsupported output tensor type {other}"
                )));
            }
        };

        let tensor = OutputTensor::new(dims, data);
        let params = QuantParams::new(quant.scale, quant.zero_point);
        Ok(if kind != TFLITE_FLOAT32 && params.is_active() {
            tensor.with_quant(params)
        } else {
            tensor
        })
    }
}

impl InferenceEngine for TfliteEngine {
    fn backend(&self) -> Backend {
        if self.delegate.is_some() {
            Backend::Accelerator
        } else {
            Backend::Cpu
        }
    }

    fn load(&mut self, model_path: &Path) -> std::result::Result<(), EngineError> {
        let c_path = CString::new(model_path.as_os_str().as_encoded_bytes())
            .map_err(|_| EngineError::fault("model path contains a NUL byte"))?;
        // SAFETY: c_path is a valid NUL-terminated string for the call.
        let raw = unsafe { (self.api.model_create_from_file)(c_path.as_ptr()) };
        let model = NonNull::new(raw).ok_or_else(|| {
            EngineError::status(1, format!("could not read {}", model_path.display()))
        })?;
        self.model = Some(model);
        Ok(())
    }

    fn initialize_runtime(&mut self, _core_mask: CoreMask) -> std::result::Result<(), EngineError> {
        let model = self
            .model
            .ok_or_else(|| EngineError::fault("no model loaded"))?;

        // SAFETY: options are created, configured and kept alive until release.
        let options = unsafe { (self.api.options_create)() };
        let options = NonNull::new(options)
            .ok_or_else(|| EngineError::fault("could not create interpreter options"))?;
        self.options = Some(options);

        if let Some(delegate) = &self.delegate {
            // SAFETY: the delegate outlives the interpreter (see `release`).
            unsafe { (self.api.options_add_delegate)(options.as_ptr(), delegate.handle.as_ptr()) };
        }

        // SAFETY: model and options are live.
        let raw = unsafe { (self.api.interpreter_create)(model.as_ptr(), options.as_ptr()) };
        let interpreter = NonNull::new(raw)
            .ok_or_else(|| EngineError::status(1, "could not create interpreter"))?;
        self.interpreter = Some(interpreter);

        // SAFETY: interpreter is live.
        let ret = unsafe { (self.api.allocate_tensors)(interpreter.as_ptr()) };
        Self::check(ret)
    }

    fn invoke(&mut self, input: &InputTensor) -> std::result::Result<Vec<OutputTensor>, EngineError> {
        let interpreter = self.interpreter()?.as_ptr();
        let api = Arc::clone(&self.api);

        // SAFETY: interpreter is live; index 0 exists for every supported model.
        let tensor = unsafe { (api.get_input_tensor)(interpreter, 0) };
        if tensor.is_null() {
            return Err(EngineError::fault("model has no input tensor"));
        }
        // SAFETY: tensor is the live input tensor.
        let expected = unsafe { (api.tensor_byte_size)(tensor) };
        if expected != input.data.len() {
            return Err(EngineError::fault(format!(
                "input tensor needs {expected} bytes, got {}",
                input.data.len()
            )));
        }
        // SAFETY: sizes were checked above.
        let ret = unsafe {
            (api.tensor_copy_from_buffer)(tensor, input.data.as_ptr().cast(), input.data.len())
        };
        Self::check(ret)?;

        // SAFETY: interpreter is live with tensors allocated.
        let ret = unsafe { (api.invoke)(interpreter) };
        Self::check(ret)?;

        // SAFETY: interpreter is live.
        let count = unsafe { (api.get_output_tensor_count)(interpreter) };
        (0..count)
            .map(|index| {
                // SAFETY: index is below the reported output count.
                let tensor = unsafe { (api.get_output_tensor)(interpreter, index) };
                if tensor.is_null() {
                    return Err(EngineError::fault(format!("output {index} missing")));
                }
                self.read_output(tensor)
            })
            .collect()
    }

    fn release(&mut self) {
        // SAFETY: each handle is deleted once, interpreter before its model
        // and options, delegate after all of them.
        unsafe {
            if let Some(interpreter) = self.interpreter.take() {
                (self.api.interpreter_delete)(interpreter.as_ptr());
            }
            if let Some(options) = self.options.take() {
                (self.api.options_delete)(options.as_ptr());
            }
            if let Some(model) = self.model.take() {
                (self.api.model_delete)(model.as_ptr());
            }
        }
        self.delegate = None;
    }
}

impl Drop for TfliteEngine {
    fn drop(&mut self) {
        self.release();
    }
}
