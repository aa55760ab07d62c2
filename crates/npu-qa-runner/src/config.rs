//! Harness configuration
//!
//! Every value has a stack default (see [`HarnessConfig::for_stack`]). A YAML
//! file overlays the defaults field by field, so a file only needs the keys
//! it changes:
//!
//! ```yaml
//! stack: teflon
//! models_dir: /opt/models
//! repeat_count: 25
//! delegate:
//!   search_paths: [/opt/mesa/lib/libteflon.so]
//! ```
//!
//! Setting `recognition: null` disables the optional recognition case.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Directory holding model files, dictionaries and test images
pub const DEFAULT_MODELS_DIR: &str = "/usr/local/lib/hw-test/models";

/// Timed passes per case
pub const DEFAULT_REPEAT_COUNT: usize = 10;

/// Seed of the synthetic classification input
pub const DEFAULT_INPUT_SEED: u64 = 42;

/// Inference runtime stack under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stack {
    /// Rockchip vendor runtime (`librknnrt.so`)
    #[default]
    Rknpu,
    /// TFLite with the Mesa Teflon delegate
    Teflon,
}

impl Stack {
    /// Default runtime shared library
    #[must_use]
    pub const fn runtime_library(&self) -> &'static str {
        match self {
            Self::Rknpu => "librknnrt.so",
            Self::Teflon => "libtensorflowlite_c.so",
        }
    }

    /// Config/CLI name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rknpu => "rknpu",
            Self::Teflon => "teflon",
        }
    }
}

impl fmt::Display for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stack {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rknpu" | "rknn" => Ok(Self::Rknpu),
            "teflon" | "tflite" => Ok(Self::Teflon),
            other => Err(Error::Config(format!(
                "unknown stack '{other}' (expected rknpu or teflon)"
            ))),
        }
    }
}

/// NPU cores the vendor runtime may schedule on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoreMask {
    /// Let the runtime pick
    #[default]
    Auto,
    /// First core only
    Core0,
    /// Second core only
    Core1,
    /// Third core only
    Core2,
    /// All cores
    All,
}

/// Delegate plugin discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DelegateConfig {
    /// Look for and load a delegate at all
    pub enabled: bool,
    /// Plugin file name matched during the recursive search
    pub file_name: String,
    /// Fixed candidates, checked in order
    pub search_paths: Vec<PathBuf>,
    /// Root of the recursive fallback search
    pub search_root: Option<PathBuf>,
}

impl Default for DelegateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file_name: "libteflon.so".to_string(),
            search_paths: [
                "/usr/lib/aarch64-linux-gnu/libteflon.so",
                "/usr/lib/libteflon.so",
                "/usr/local/lib/libteflon.so",
                "/usr/local/lib/aarch64-linux-gnu/libteflon.so",
                "/usr/lib64/libteflon.so",
            ]
            .into_iter()
            .map(PathBuf::from)
            .collect(),
            search_root: Some(PathBuf::from("/usr/lib")),
        }
    }
}

/// Mandatory image-classification case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassificationCase {
    /// Report key
    pub name: String,
    /// Model file name inside the models directory
    pub model_file: String,
    /// Input tensor shape (NHWC or HWC, last dimension 3)
    pub input_shape: Vec<usize>,
}

/// Optional text-recognition case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecognitionCase {
    /// Report key
    pub name: String,
    /// Model file name inside the models directory
    pub model_file: String,
    /// Character dictionary, one symbol per line
    pub dictionary_file: String,
    /// Test image with known text
    pub image_file: String,
    /// Text the image contains
    pub expected_text: Option<String>,
    /// Model input height
    pub input_height: u32,
    /// Model input width (image is right-padded to it)
    pub input_width: u32,
}

impl Default for RecognitionCase {
    fn default() -> Self {
        Self {
            name: "ocr".to_string(),
            model_file: "ppocrv4_rec.rknn".to_string(),
            dictionary_file: "ppocr_keys_v1.txt".to_string(),
            image_file: "ocr_test_image.png".to_string(),
            expected_text: Some("JOINT".to_string()),
            input_height: 48,
            input_width: 320,
        }
    }
}

/// Complete harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// Runtime stack
    pub stack: Stack,
    /// Directory holding models and test assets
    pub models_dir: PathBuf,
    /// Runtime shared library (bare names go through the loader search path)
    pub runtime_library: PathBuf,
    /// Timed passes after the warm-up
    pub repeat_count: usize,
    /// Output maximum below which output counts as uniform/zero
    pub uniform_threshold: f32,
    /// Max score above which output counts as unnormalized logits
    pub logit_threshold: f32,
    /// Predictions reported per classification case
    pub top_k: usize,
    /// Seed of the synthetic classification input
    pub input_seed: u64,
    /// NPU core selection (vendor runtime only)
    pub core_mask: CoreMask,
    /// Delegate discovery (delegate-based stacks only)
    pub delegate: DelegateConfig,
    /// Mandatory classification case
    pub classification: ClassificationCase,
    /// Optional recognition case
    pub recognition: Option<RecognitionCase>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::for_stack(Stack::default())
    }
}

impl HarnessConfig {
    /// Defaults for a runtime stack
    #[must_use]
    pub fn for_stack(stack: Stack) -> Self {
        let (model_file, input_shape, recognition) = match stack {
            Stack::Rknpu => (
                "mobilenet_v1.rknn",
                vec![224, 224, 3],
                Some(RecognitionCase::default()),
            ),
            Stack::Teflon => ("mobilenet_v1_1.0_224_quant.tflite", vec![1, 224, 224, 3], None),
        };

        Self {
            stack,
            models_dir: PathBuf::from(DEFAULT_MODELS_DIR),
            runtime_library: PathBuf::from(stack.runtime_library()),
            repeat_count: DEFAULT_REPEAT_COUNT,
            uniform_threshold: npu_qa_decode::DEFAULT_UNIFORM_THRESHOLD,
            logit_threshold: npu_qa_decode::DEFAULT_LOGIT_THRESHOLD,
            top_k: npu_qa_decode::DEFAULT_TOP_K,
            input_seed: DEFAULT_INPUT_SEED,
            core_mask: CoreMask::default(),
            delegate: DelegateConfig::default(),
            classification: ClassificationCase {
                name: "mobilenet".to_string(),
                model_file: model_file.to_string(),
                input_shape,
            },
            recognition,
        }
    }

    /// Overlay YAML onto stack defaults
    ///
    /// The stack is taken from `stack_override`, else from the YAML `stack`
    /// key, else the default stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed, names unknown keys, or the
    /// result fails [`HarnessConfig::validate`].
    pub fn from_yaml_str(yaml: &str, stack_override: Option<Stack>) -> Result<Self> {
        let mut overlay: Value = serde_yaml::from_str(yaml)?;
        let file_stack = match overlay.get("stack") {
            Some(value) => Some(serde_yaml::from_value::<Stack>(value.clone())?),
            None => None,
        };
        let stack = stack_override.or(file_stack).unwrap_or_default();
        if let Value::Mapping(map) = &mut overlay {
            map.remove("stack");
        }

        let mut merged = serde_yaml::to_value(Self::for_stack(stack))?;
        if !overlay.is_null() {
            merge_yaml(&mut merged, overlay);
        }
        let config: Self = serde_yaml::from_value(merged)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay a YAML file onto stack defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path, stack_override: Option<Stack>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content, stack_override)
    }

    /// Render as YAML
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::Config(msg));

        if self.repeat_count == 0 {
            return invalid("repeat_count must be at least 1".into());
        }
        if self.top_k == 0 {
            return invalid("top_k must be at least 1".into());
        }
        if !self.uniform_threshold.is_finite() || self.uniform_threshold < 0.0 {
            return invalid(format!(
                "uniform_threshold must be a non-negative number, got {}",
                self.uniform_threshold
            ));
        }
        if !self.logit_threshold.is_finite() {
            return invalid("logit_threshold must be finite".into());
        }

        let shape = &self.classification.input_shape;
        if shape.last() != Some(&3) || shape.contains(&0) {
            return invalid(format!(
                "classification.input_shape must be non-empty with last dimension 3, got {shape:?}"
            ));
        }
        if let Some(rec) = &self.recognition {
            if rec.input_height == 0 || rec.input_width == 0 {
                return invalid("recognition input size must be non-zero".into());
            }
        }
        if self.delegate.enabled && self.delegate.file_name.is_empty() {
            return invalid("delegate.file_name must not be empty".into());
        }
        Ok(())
    }

    /// Full path of a file in the models directory
    #[must_use]
    pub fn model_path(&self, file: &str) -> PathBuf {
        self.models_dir.join(file)
    }
}

fn merge_yaml(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_yaml(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
