//! NPU QA CLI Library
//!
//! Library functions behind the `npu-qa` binary. Every command renders to a
//! string plus an exit code so the binary only prints and exits.

#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_const_for_fn)]
// Allow common patterns in test code
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

use npu_qa_runner::{Error, HarnessConfig, RunReport, Stack, probe_stack, run_stack};
use std::path::PathBuf;

/// Rendered command output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOutput {
    /// Text for stdout
    pub stdout: String,
    /// Process exit code
    pub exit_code: i32,
}

impl CliOutput {
    fn new(stdout: String, exit_code: i32) -> Self {
        Self { stdout, exit_code }
    }
}

/// Global flags that overlay the configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// YAML config file
    pub config_file: Option<PathBuf>,
    /// Runtime stack
    pub stack: Option<Stack>,
    /// Models directory
    pub models_dir: Option<PathBuf>,
    /// Timed passes per case
    pub repeat: Option<usize>,
    /// Runtime shared library
    pub runtime_lib: Option<PathBuf>,
    /// Skip delegate discovery
    pub no_delegate: bool,
}

/// Parse a stack name for clap
pub fn parse_stack(value: &str) -> Result<Stack, String> {
    value.parse().map_err(|e: Error| e.to_string())
}

/// Build the effective configuration: stack defaults, then file, then flags
pub fn build_config(overrides: &ConfigOverrides) -> Result<HarnessConfig, Error> {
    let mut config = match &overrides.config_file {
        Some(path) => HarnessConfig::from_file(path, overrides.stack)?,
        None => HarnessConfig::for_stack(overrides.stack.unwrap_or_default()),
    };

    if let Some(dir) = &overrides.models_dir {
        config.models_dir.clone_from(dir);
    }
    if let Some(repeat) = overrides.repeat {
        config.repeat_count = repeat;
    }
    if let Some(lib) = &overrides.runtime_lib {
        config.runtime_library.clone_from(lib);
    }
    if overrides.no_delegate {
        config.delegate.enabled = false;
    }
    config.validate()?;
    Ok(config)
}

fn render_report(report: &RunReport, exit_code: i32) -> CliOutput {
    match report.to_json() {
        Ok(json) => CliOutput::new(json, exit_code),
        Err(e) => CliOutput::new(
            format!(
                "{{\"status\": \"FAIL\", \"error\": {}}}",
                serde_json::Value::String(e.to_string())
            ),
            1,
        ),
    }
}

fn config_failure(error: &Error) -> CliOutput {
    let report = RunReport::aborted(error);
    render_report(&report, report.exit_code())
}

/// `run`: execute every case and render the report
pub fn run_command(overrides: &ConfigOverrides) -> CliOutput {
    let config = match build_config(overrides) {
        Ok(config) => config,
        Err(e) => return config_failure(&e),
    };
    let report = run_stack(config);
    let exit_code = report.exit_code();
    render_report(&report, exit_code)
}

/// `config`: render the effective configuration as YAML
pub fn config_command(overrides: &ConfigOverrides) -> CliOutput {
    match build_config(overrides).and_then(|config| config.to_yaml()) {
        Ok(yaml) => CliOutput::new(yaml, 0),
        Err(e) => config_failure(&e),
    }
}

/// `probe`: render runtime and delegate resolution without inference
pub fn probe_command(overrides: &ConfigOverrides) -> CliOutput {
    let config = match build_config(overrides) {
        Ok(config) => config,
        Err(e) => return config_failure(&e),
    };
    let probe = probe_stack(&config);
    match serde_json::to_string_pretty(&probe) {
        Ok(json) => CliOutput::new(json, 0),
        Err(e) => config_failure(&Error::from(e)),
    }
}
