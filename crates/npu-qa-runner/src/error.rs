//! Error types for npu-qa-runner
//!
//! Every variant maps onto exactly one verdict status (see [`Error::status`]).
//! Errors never escape a test case: the orchestrator converts them into a
//! verdict record at the case boundary.

use crate::engine::EngineError;
use crate::verdict::Status;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of the external inference engine, by pipeline stage
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineFailure {
    /// Model could not be loaded
    #[error("Model load failed ({0})")]
    Load(EngineError),

    /// Runtime could not be initialized on the device
    #[error("NPU runtime init failed ({0})")]
    Initialize(EngineError),

    /// The untimed warm-up invocation failed
    #[error("Warm-up inference failed: {0}")]
    WarmUp(EngineError),

    /// A timed invocation failed
    #[error("Inference failed: {0}")]
    Invoke(EngineError),

    /// The engine returned no output tensors
    #[error("No output from inference")]
    NoOutput,
}

/// Errors that can occur while running a test case
#[derive(Debug, Error)]
pub enum Error {
    /// Required artifact, runtime or host capability is missing
    #[error("{0}")]
    Unavailable(String),

    /// Load/init/invoke failure reported by the inference engine
    #[error(transparent)]
    Engine(#[from] EngineFailure),

    /// Output failed numerical validation or could not be decoded
    #[error(transparent)]
    DataIntegrity(#[from] npu_qa_decode::Error),

    /// Decoded text differs from the known ground truth
    #[error("Recognized text {recognized:?} does not match expected {expected:?}")]
    SemanticMismatch {
        /// Ground-truth text
        expected: String,
        /// Decoder output
        recognized: String,
    },

    /// Test image exists but could not be decoded
    #[error("Could not load test image: {0}")]
    ImageDecode(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl Error {
    /// Verdict status this error produces
    #[must_use]
    pub const fn status(&self) -> Status {
        match self {
            Self::Unavailable(_) => Status::Skip,
            Self::SemanticMismatch { .. } => Status::Warn,
            _ => Status::Fail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_failure_messages() {
        let err = EngineFailure::Load(EngineError::status(-6, "model invalid"));
        assert_eq!(err.to_string(), "Model load failed (ret=-6, model invalid)");

        let err = EngineFailure::Initialize(EngineError::status(-3, "device unavailable"));
        assert_eq!(
            err.to_string(),
            "NPU runtime init failed (ret=-3, device unavailable)"
        );

        let err = EngineFailure::WarmUp(EngineError::fault("driver timeout"));
        assert_eq!(err.to_string(), "Warm-up inference failed: driver timeout");

        let err = EngineFailure::Invoke(EngineError::fault("bus error"));
        assert_eq!(err.to_string(), "Inference failed: bus error");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::Unavailable("x".into()).status(), Status::Skip);
        assert_eq!(
            Error::Engine(EngineFailure::NoOutput).status(),
            Status::Fail
        );
        assert_eq!(
            Error::DataIntegrity(npu_qa_decode::Error::EmptyOutput).status(),
            Status::Fail
        );
        assert_eq!(
            Error::SemanticMismatch {
                expected: "JOINT".into(),
                recognized: "J0INT".into(),
            }
            .status(),
            Status::Warn
        );
        assert_eq!(Error::Config("bad".into()).status(), Status::Fail);
    }

    #[test]
    fn test_data_integrity_is_transparent() {
        let err: Error = npu_qa_decode::Error::NonFinite {
            nan_count: 1,
            inf_count: 0,
        }
        .into();
        assert_eq!(err.to_string(), "NaN/Inf in output");
    }

    #[test]
    fn test_semantic_mismatch_message() {
        let err = Error::SemanticMismatch {
            expected: "JOINT".into(),
            recognized: "JOlNT".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("\"JOINT\""));
        assert!(msg.contains("\"JOlNT\""));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::IoError(_)));
        assert_eq!(err.status(), Status::Fail);
    }
}
