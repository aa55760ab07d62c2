//! Test fixtures for npu-qa-runner unit tests
//!
//! A throwaway models directory laid out like the board image, holding
//! placeholder model files the mock runtime accepts.

use crate::config::{HarnessConfig, Stack};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Character dictionary with `J O I N T` at classes 1..=5
pub const DICTIONARY: &str = "J\nO\nI\nN\nT\n";

/// Temporary models directory
pub struct ModelDir {
    dir: TempDir,
    stack: Stack,
}

impl ModelDir {
    /// Empty directory configured for the vendor runtime stack
    #[must_use]
    pub fn new() -> Self {
        Self::for_stack(Stack::Rknpu)
    }

    /// Empty directory for a stack
    #[must_use]
    pub fn for_stack(stack: Stack) -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
            stack,
        }
    }

    /// Directory path
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a placeholder file
    #[must_use]
    pub fn with_file(self, name: &str, contents: &[u8]) -> Self {
        fs::write(self.dir.path().join(name), contents).expect("write fixture");
        self
    }

    /// Add the classification model
    #[must_use]
    pub fn with_classification_model(self) -> Self {
        let name = HarnessConfig::for_stack(self.stack).classification.model_file;
        self.with_file(&name, b"placeholder model")
    }

    /// Add recognition model and dictionary (no image)
    #[must_use]
    pub fn with_recognition_model(self) -> Self {
        self.with_file("ppocrv4_rec.rknn", b"placeholder model")
            .with_file("ppocr_keys_v1.txt", DICTIONARY.as_bytes())
    }

    /// Configuration pointing at this directory, delegates disabled, 3 passes
    #[must_use]
    pub fn config(&self) -> HarnessConfig {
        let mut config = HarnessConfig::for_stack(self.stack);
        config.models_dir = self.dir.path().to_path_buf();
        config.delegate.enabled = false;
        config.repeat_count = 3;
        config
    }
}

impl Default for ModelDir {
    fn default() -> Self {
        Self::new()
    }
}
