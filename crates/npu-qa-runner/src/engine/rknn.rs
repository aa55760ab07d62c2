//! Rockchip RKNPU runtime adapter
//!
//! Binds `librknnrt.so` at run time through `libloading`; nothing links
//! against the vendor library, so the harness builds and runs (and reports
//! SKIP) on hosts without it. Every handle executes on the NPU.
#![allow(unsafe_code)]

use super::{EngineError, InferenceEngine, InputTensor, OutputTensor, Runtime};
use crate::backend::Backend;
use crate::config::CoreMask;
use crate::error::{Error, Result};
use libloading::Library;
use std::convert::Infallible;
use std::ffi::{c_char, c_int, c_void};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

type RknnContext = u64;

const RKNN_MAX_DIMS: usize = 16;
const RKNN_MAX_NAME_LEN: usize = 256;

const RKNN_QUERY_IN_OUT_NUM: c_int = 0;
const RKNN_QUERY_OUTPUT_ATTR: c_int = 2;

const RKNN_TENSOR_UINT8: c_int = 3;
const RKNN_TENSOR_NHWC: c_int = 1;

#[repr(C)]
#[derive(Debug, Default)]
#[allow(dead_code)]
struct RknnInOutNum {
    n_input: u32,
    n_output: u32,
}

#[repr(C)]
#[allow(dead_code)]
struct RknnTensorAttr {
    index: u32,
    n_dims: u32,
    dims: [u32; RKNN_MAX_DIMS],
    name: [c_char; RKNN_MAX_NAME_LEN],
    n_elems: u32,
    size: u32,
    fmt: c_int,
    kind: c_int,
    qnt_type: c_int,
    fl: i8,
    zp: i32,
    scale: f32,
    w_stride: u32,
    size_with_stride: u32,
    pass_through: u8,
    h_stride: u32,
}

impl RknnTensorAttr {
    fn for_index(index: u32) -> Self {
        Self {
            index,
            n_dims: 0,
            dims: [0; RKNN_MAX_DIMS],
            name: [0; RKNN_MAX_NAME_LEN],
            n_elems: 0,
            size: 0,
            fmt: 0,
            kind: 0,
            qnt_type: 0,
            fl: 0,
            zp: 0,
            scale: 0.0,
            w_stride: 0,
            size_with_stride: 0,
            pass_through: 0,
            h_stride: 0,
        }
    }

    fn shape(&self) -> Vec<usize> {
        let n = (self.n_dims as usize).min(RKNN_MAX_DIMS);
        self.dims[..n].iter().map(|&d| d as usize).collect()
    }
}

#[repr(C)]
#[allow(dead_code)]
struct RknnInput {
    index: u32,
    buf: *mut c_void,
    size: u32,
    pass_through: u8,
    kind: c_int,
    fmt: c_int,
}

#[repr(C)]
#[allow(dead_code)]
struct RknnOutput {
    want_float: u8,
    is_prealloc: u8,
    index: u32,
    buf: *mut c_void,
    size: u32,
}

type InitFn = unsafe extern "C" fn(*mut RknnContext, *mut c_void, u32, u32, *mut c_void) -> c_int;
type SetCoreMaskFn = unsafe extern "C" fn(RknnContext, c_int) -> c_int;
type QueryFn = unsafe extern "C" fn(RknnContext, c_int, *mut c_void, u32) -> c_int;
type InputsSetFn = unsafe extern "C" fn(RknnContext, u32, *mut RknnInput) -> c_int;
type RunFn = unsafe extern "C" fn(RknnContext, *mut c_void) -> c_int;
type OutputsGetFn = unsafe extern "C" fn(RknnContext, u32, *mut RknnOutput, *mut c_void) -> c_int;
type OutputsReleaseFn = unsafe extern "C" fn(RknnContext, u32, *mut RknnOutput) -> c_int;
type DestroyFn = unsafe extern "C" fn(RknnContext) -> c_int;

/// Meaning of an RKNN status code
#[must_use]
pub fn describe_status(code: i32) -> &'static str {
    match code {
        0 => "success",
        -1 => "execution failed",
        -2 => "execution timed out",
        -3 => "device unavailable",
        -4 => "memory allocation failed",
        -5 => "invalid parameter",
        -6 => "invalid model",
        -7 => "invalid context",
        -8 => "invalid input",
        -9 => "invalid output",
        -10 => "device does not match",
        -11 => "pre-compiled model incompatible with runtime",
        -12 => "optimization level incompatible with runtime",
        -13 => "model built for another target platform",
        _ => "unknown error",
    }
}

const fn core_mask_bits(mask: CoreMask) -> c_int {
    match mask {
        CoreMask::Auto => 0,
        CoreMask::Core0 => 1,
        CoreMask::Core1 => 2,
        CoreMask::Core2 => 4,
        CoreMask::All => 7,
    }
}

struct RknnApi {
    init: InitFn,
    set_core_mask: SetCoreMaskFn,
    query: QueryFn,
    inputs_set: InputsSetFn,
    run: RunFn,
    outputs_get: OutputsGetFn,
    outputs_release: OutputsReleaseFn,
    destroy: DestroyFn,
    // Keeps the function pointers above valid.
    _library: Library,
}

fn symbol<T: Copy>(library: &Library, name: &[u8]) -> std::result::Result<T, libloading::Error> {
    // SAFETY: every call site pairs the symbol name with its rknn_api.h prototype.
    unsafe { library.get::<T>(name).map(|sym| *sym) }
}

impl RknnApi {
    fn open(path: &Path) -> std::result::Result<Self, libloading::Error> {
        // SAFETY: librknnrt has no load-time initializers with preconditions.
        let library = unsafe { Library::new(path) }?;
        Ok(Self {
            init: symbol(&library, b"rknn_init\0")?,
            set_core_mask: symbol(&library, b"rknn_set_core_mask\0")?,
            query: symbol(&library, b"rknn_query\0")?,
            inputs_set: symbol(&library, b"rknn_inputs_set\0")?,
            run: symbol(&library, b"rknn_run\0")?,
            outputs_get: symbol(&library, b"rknn_outputs_get\0")?,
            outputs_release: symbol(&library, b"rknn_outputs_release\0")?,
            destroy: symbol(&library, b"rknn_destroy\0")?,
            _library: library,
        })
    }
}

/// The RKNPU runtime library
pub struct RknnRuntime {
    api: Arc<RknnApi>,
    library: PathBuf,
}

impl RknnRuntime {
    /// Open the runtime library
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] if the library or one of its symbols
    /// cannot be loaded.
    pub fn open(library: &Path) -> Result<Self> {
        let api = RknnApi::open(library).map_err(|e| {
            Error::Unavailable(format!(
                "RKNN runtime not installed ({}): {e}",
                library.display()
            ))
        })?;
        debug!(library = %library.display(), "loaded RKNN runtime");
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

impl Runtime for RknnRuntime {
    type Delegate = Infallible;

    fn name(&self) -> &'static str {
        "rknpu"
    }

    fn native_backend(&self) -> Option<Backend> {
        Some(Backend::Accelerator)
    }

    fn load_delegate(&self, _path: &Path) -> std::result::Result<Infallible, EngineError> {
        Err(EngineError::fault("RKNN runtime does not take delegates"))
    }

    fn create_engine(&self, _delegate: Option<Infallible>) -> Box<dyn InferenceEngine> {
        Box::new(RknnEngine {
            api: Arc::clone(&self.api),
            model: None,
            context: None,
            output_shapes: Vec::new(),
        })
    }
}

/// One RKNN context
pub struct RknnEngine {
    api: Arc<RknnApi>,
    model: Option<Vec<u8>>,
    context: Option<RknnContext>,
    output_shapes: Vec<Vec<usize>>,
}

impl RknnEngine {
    fn context(&self) -> std::result::Result<RknnContext, EngineError> {
        self.context
            .ok_or_else(|| EngineError::fault("runtime not initialized"))
    }

    fn check(code: c_int) -> std::result::Result<(), EngineError> {
        super::check_status(code, describe_status)
    }

    fn query_output_shapes(&mut self, ctx: RknnContext) -> std::result::Result<(), EngineError> {
        let mut io_num = RknnInOutNum::default();
        // SAFETY: the buffer is a correctly sized rknn_input_output_num.
        let ret = unsafe {
            (self.api.query)(
                ctx,
                RKNN_QUERY_IN_OUT_NUM,
                (&raw mut io_num).cast(),
                size_of::<RknnInOutNum>() as u32,
            )
        };
        Self::check(ret)?;

        self.output_shapes = (0..io_num.n_output)
            .map(|index| {
                let mut attr = RknnTensorAttr::for_index(index);
                // SAFETY: the buffer is a correctly sized rknn_tensor_attr.
                let ret = unsafe {
                    (self.api.query)(
                        ctx,
                        RKNN_QUERY_OUTPUT_ATTR,
                        (&raw mut attr).cast(),
                        size_of::<RknnTensorAttr>() as u32,
                    )
                };
                Self::check(ret).map(|()| attr.shape())
            })
            .collect::<std::result::Result<_, _>>()?;
        Ok(())
    }
}

impl InferenceEngine for RknnEngine {
    fn backend(&self) -> Backend {
        Backend::Accelerator
    }

    fn load(&mut self, model_path: &Path) -> std::result::Result<(), EngineError> {
        let bytes = std::fs::read(model_path)
            .map_err(|e| EngineError::fault(format!("{}: {e}", model_path.display())))?;
        if bytes.is_empty() {
            return Err(EngineError::status(-6, describe_status(-6)));
        }
        debug!(path = %model_path.display(), bytes = bytes.len(), "read RKNN model");
        self.model = Some(bytes);
        Ok(())
    }

    fn initialize_runtime(&mut self, core_mask: CoreMask) -> std::result::Result<(), EngineError> {
        let model = self
            .model
            .as_mut()
            .ok_or_else(|| EngineError::fault("no model loaded"))?;
        let size = u32::try_from(model.len())
            .map_err(|_| EngineError::fault("model larger than 4 GiB"))?;

        let mut ctx: RknnContext = 0;
        // SAFETY: `model` outlives the call; rknn_init copies what it keeps.
        let ret = unsafe {
            (self.api.init)(
                &raw mut ctx,
                model.as_mut_ptr().cast(),
                size,
                0,
                std::ptr::null_mut(),
            )
        };
        Self::check(ret)?;
        self.context = Some(ctx);

        // SAFETY: ctx was just created by rknn_init.
        let ret = unsafe { (self.api.set_core_mask)(ctx, core_mask_bits(core_mask)) };
        Self::check(ret)?;

        self.query_output_shapes(ctx)
    }

    fn invoke(&mut self, input: &InputTensor) -> std::result::Result<Vec<OutputTensor>, EngineError> {
        let ctx = self.context()?;
        let size = u32::try_from(input.data.len())
            .map_err(|_| EngineError::fault("input larger than 4 GiB"))?;

        let mut inputs = [RknnInput {
            index: 0,
            // The runtime reads but never writes input buffers.
            buf: input.data.as_ptr().cast_mut().cast(),
            size,
            pass_through: 0,
            kind: RKNN_TENSOR_UINT8,
            fmt: RKNN_TENSOR_NHWC,
        }];
        // SAFETY: one valid rknn_input pointing at `input.data`.
        let ret = unsafe { (self.api.inputs_set)(ctx, 1, inputs.as_mut_ptr()) };
        Self::check(ret)?;

        // SAFETY: ctx is live and inputs are set.
        let ret = unsafe { (self.api.run)(ctx, std::ptr::null_mut()) };
        Self::check(ret)?;

        let count = self.output_shapes.len();
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut outputs: Vec<RknnOutput> = (0..count as u32)
            .map(|index| RknnOutput {
                want_float: 1,
                is_prealloc: 0,
                index,
                buf: std::ptr::null_mut(),
                size: 0,
            })
            .collect();
        // SAFETY: `outputs` holds `count` entries, matching the queried output number.
        let ret = unsafe {
            (self.api.outputs_get)(ctx, count as u32, outputs.as_mut_ptr(), std::ptr::null_mut())
        };
        Self::check(ret)?;

        let tensors = outputs
            .iter()
            .zip(&self.output_shapes)
            .map(|(out, shape)| {
                if out.buf.is_null() {
                    return Err(EngineError::fault(format!("output {} has no buffer", out.index)));
                }
                let len = out.size as usize / size_of::<f32>();
                // SAFETY: with want_float the runtime fills `size` bytes of f32.
                let values = unsafe { std::slice::from_raw_parts(out.buf.cast::<f32>(), len) };
                Ok(OutputTensor::new(shape.clone(), values.to_vec()))
            })
            .collect::<std::result::Result<Vec<_>, _>>();

        // SAFETY: releases the buffers returned by the rknn_outputs_get above.
        let ret = unsafe { (self.api.outputs_release)(ctx, count as u32, outputs.as_mut_ptr()) };
        let tensors = tensors?;
        Self::check(ret)?;
        Ok(tensors)
    }

    fn release(&mut self) {
        if let Some(ctx) = self.context.take() {
            // SAFETY: ctx came from rknn_init and is destroyed once.
            let ret = unsafe { (self.api.destroy)(ctx) };
            if ret != 0 {
                tracing::warn!(ret, "rknn_destroy failed");
            }
        }
        self.model = None;
    }
}

impl Drop for RknnEngine {
    fn drop(&mut self) {
        self.release();
    }
}
