//! Structured logging setup
//!
//! Logs go to stderr; stdout carries nothing but the JSON report.
//!
//! - `-v` / `-vv` select info / debug for the harness crates
//! - otherwise `RUST_LOG` is honored
//! - otherwise logging is off
//! - `RUST_LOG_FORMAT=json` switches to JSON lines

use tracing_subscriber::EnvFilter;

const CRATES: [&str; 3] = ["npu_qa_runner", "npu_qa_decode", "npu_qa"];

/// Filter directive for a verbosity level, `None` at level 0
#[must_use]
pub fn verbosity_directive(verbosity: u8) -> Option<String> {
    let level = match verbosity {
        0 => return None,
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    Some(
        CRATES
            .iter()
            .map(|krate| format!("{krate}={level}"))
            .collect::<Vec<_>>()
            .join(","),
    )
}

fn build_filter(verbosity: u8) -> EnvFilter {
    match verbosity_directive(verbosity) {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off")),
    }
}

/// Initialize the global tracing subscriber
///
/// Safe to call more than once; later calls are no-ops.
pub fn init(verbosity: u8) {
    let is_json = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(build_filter(verbosity))
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false);

    if is_json {
        let _ = subscriber.json().try_init();
    } else {
        let _ = subscriber.try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_does_not_panic() {
        init(0);
        init(2);
    }

    #[test]
    fn test_verbosity_directive() {
        assert_eq!(verbosity_directive(0), None);
        let info = verbosity_directive(1).unwrap();
        assert!(info.contains("npu_qa_runner=info"));
        assert!(info.contains("npu_qa_decode=info"));
        assert!(verbosity_directive(2).unwrap().contains("=debug"));
        assert!(verbosity_directive(9).unwrap().contains("=trace"));
    }

    #[test]
    fn test_filter_from_verbosity() {
        let filter = build_filter(1);
        assert!(format!("{filter}").contains("npu_qa_runner=info"));
    }
}
