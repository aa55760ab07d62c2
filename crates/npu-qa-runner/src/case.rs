//! Test case definitions

use crate::config::HarnessConfig;
use std::path::{Path, PathBuf};

/// How the input tensor is produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputRecipe {
    /// Seeded pseudo-random bytes
    Synthetic {
        /// Tensor shape
        shape: Vec<usize>,
        /// RNG seed
        seed: u64,
    },
    /// Decoded image, scaled and padded
    Image {
        /// Image file
        path: PathBuf,
        /// Target height
        height: u32,
        /// Target width
        width: u32,
    },
}

/// How the output tensor is interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeMode {
    /// Ranked class scores
    Classification {
        /// Predictions to report
        top_k: usize,
    },
    /// Per-timestep symbol distribution, CTC-decoded to text
    SequenceRecognition {
        /// Character dictionary
        dictionary: PathBuf,
        /// Ground truth, if known
        expected_text: Option<String>,
    },
}

/// One qualification case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    /// Report key
    pub name: String,
    /// Model file
    pub model_path: PathBuf,
    /// Input construction
    pub input: InputRecipe,
    /// Output interpretation
    pub mode: DecodeMode,
}

impl TestCase {
    /// Cases described by a configuration, mandatory classification first
    #[must_use]
    pub fn from_config(config: &HarnessConfig) -> Vec<Self> {
        let classification = &config.classification;
        let mut cases = vec![Self {
            name: classification.name.clone(),
            model_path: config.model_path(&classification.model_file),
            input: InputRecipe::Synthetic {
                shape: classification.input_shape.clone(),
                seed: config.input_seed,
            },
            mode: DecodeMode::Classification { top_k: config.top_k },
        }];

        if let Some(rec) = &config.recognition {
            cases.push(Self {
                name: rec.name.clone(),
                model_path: config.model_path(&rec.model_file),
                input: InputRecipe::Image {
                    path: config.model_path(&rec.image_file),
                    height: rec.input_height,
                    width: rec.input_width,
                },
                mode: DecodeMode::SequenceRecognition {
                    dictionary: config.model_path(&rec.dictionary_file),
                    expected_text: rec.expected_text.clone(),
                },
            });
        }
        cases
    }

    /// Files that must exist before an engine is acquired, with their
    /// human-readable role
    #[must_use]
    pub fn required_artifacts(&self) -> Vec<(&'static str, &Path)> {
        let mut artifacts = vec![("Model", self.model_path.as_path())];
        if let DecodeMode::SequenceRecognition { dictionary, .. } = &self.mode {
            artifacts.push(("Character dictionary", dictionary.as_path()));
        }
        if let InputRecipe::Image { path, .. } = &self.input {
            artifacts.push(("Test image", path.as_path()));
        }
        artifacts
    }
}
