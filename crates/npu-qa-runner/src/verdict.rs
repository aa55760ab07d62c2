//! Verdicts and the run report
//!
//! One [`Verdict`] per test case, recorded whatever the outcome. The run
//! report is a JSON object keyed by test name; only the mandatory test
//! decides the exit code.

use crate::backend::{Backend, BackendSelection};
use crate::error::{Error, Result};
use npu_qa_decode::{LatencySummary, Prediction};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::path::PathBuf;

/// Outcome class of a test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// Pipeline ran and the output is sound
    Pass,
    /// Pipeline or output is broken
    Fail,
    /// Pipeline ran but the result is semantically wrong
    Warn,
    /// Prerequisite missing; says nothing about the hardware
    Skip,
}

impl Status {
    /// Check if this is a passing status
    #[must_use]
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Diagnostic fields of a verdict, each omitted when absent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Details {
    /// Mean timed latency in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference_ms: Option<f64>,
    /// Fastest timed pass in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_inference_ms: Option<f64>,
    /// Shape of the first output tensor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_shape: Option<Vec<usize>>,
    /// Ranked predictions (classification)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top5: Option<Vec<Prediction>>,
    /// Ground-truth text (recognition)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// Decoded text (recognition)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recognized: Option<String>,
    /// Decoded text equals ground truth (recognition)
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub matched: Option<bool>,
    /// Backend the case ran on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,
    /// Delegate plugin found for the case
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegate_path: Option<PathBuf>,
    /// Why the delegate could not be used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegate_error: Option<String>,
}

impl Details {
    /// Record backend resolution
    pub fn record_backend(&mut self, selection: &BackendSelection) {
        self.backend = Some(selection.backend);
        self.delegate_path = selection.delegate_path().map(PathBuf::from);
        self.delegate_error = selection.fallback_reason().map(String::from);
    }

    /// Record latency statistics, if any pass completed
    pub fn record_latency(&mut self, summary: Option<LatencySummary>) {
        if let Some(summary) = summary {
            self.inference_ms = Some(summary.average_ms);
            self.min_inference_ms = Some(summary.min_ms);
        }
    }
}

/// Verdict for one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Outcome class
    pub status: Status,
    /// Reason; present for every non-PASS status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Diagnostics
    #[serde(flatten)]
    pub details: Details,
}

fn reason_or_default(reason: String) -> String {
    if reason.trim().is_empty() {
        "unspecified error".to_string()
    } else {
        reason
    }
}

impl Verdict {
    /// Create a passing verdict
    #[must_use]
    pub fn pass(details: Details) -> Self {
        Self {
            status: Status::Pass,
            error: None,
            details,
        }
    }

    /// Create a failing verdict
    #[must_use]
    pub fn fail(reason: impl Into<String>, details: Details) -> Self {
        Self {
            status: Status::Fail,
            error: Some(reason_or_default(reason.into())),
            details,
        }
    }

    /// Create a warning verdict
    #[must_use]
    pub fn warn(reason: impl Into<String>, details: Details) -> Self {
        Self {
            status: Status::Warn,
            error: Some(reason_or_default(reason.into())),
            details,
        }
    }

    /// Create a skipped verdict
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            status: Status::Skip,
            error: Some(reason_or_default(reason.into())),
            details: Details::default(),
        }
    }

    /// Classify an error into a verdict, keeping what was measured so far
    #[must_use]
    pub fn from_error(error: &Error, details: Details) -> Self {
        Self {
            status: error.status(),
            error: Some(reason_or_default(error.to_string())),
            details,
        }
    }
}

/// Per-test verdicts in execution order
#[derive(Debug, Clone, PartialEq)]
pub struct TestReport {
    mandatory: String,
    entries: Vec<(String, Verdict)>,
}

impl TestReport {
    /// Create an empty report whose exit code follows `mandatory`
    #[must_use]
    pub fn new(mandatory: impl Into<String>) -> Self {
        Self {
            mandatory: mandatory.into(),
            entries: Vec::new(),
        }
    }

    /// Record a verdict
    pub fn insert(&mut self, name: impl Into<String>, verdict: Verdict) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = verdict,
            None => self.entries.push((name, verdict)),
        }
    }

    /// Look up a verdict by test name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Verdict> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Verdicts in execution order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Verdict)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of recorded verdicts
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no verdict was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mandatory test name
    #[must_use]
    pub fn mandatory(&self) -> &str {
        &self.mandatory
    }

    /// Check if the mandatory test passed
    #[must_use]
    pub fn mandatory_passed(&self) -> bool {
        self.get(&self.mandatory)
            .is_some_and(|v| v.status.is_pass())
    }
}

impl Serialize for TestReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, verdict) in &self.entries {
            map.serialize_entry(name, verdict)?;
        }
        map.end()
    }
}

/// Final report of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RunReport {
    /// Per-test verdicts
    Tests(TestReport),
    /// The run could not start (e.g. runtime library missing)
    Aborted(Verdict),
}

impl RunReport {
    /// Report for a run that could not start
    #[must_use]
    pub fn aborted(error: &Error) -> Self {
        Self::Aborted(Verdict::from_error(error, Details::default()))
    }

    /// Process exit code: 0 iff the mandatory test passed
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Tests(report) if report.mandatory_passed() => 0,
            _ => 1,
        }
    }

    /// Pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
