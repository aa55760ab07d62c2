//! Latency statistics and report rounding

use serde::{Deserialize, Serialize};

/// Round to a fixed number of decimal places (half away from zero)
#[must_use]
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

/// Average and minimum of a latency sample set, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    /// Mean pass latency, rounded to 2 decimals
    pub average_ms: f64,
    /// Fastest pass latency, rounded to 2 decimals
    pub min_ms: f64,
    /// Number of completed passes
    pub passes: usize,
}

impl LatencySummary {
    /// Summarize samples; `None` when no pass completed
    #[must_use]
    pub fn from_samples(samples_ms: &[f64]) -> Option<Self> {
        if samples_ms.is_empty() {
            return None;
        }
        let sum: f64 = samples_ms.iter().sum();
        let min = samples_ms.iter().copied().fold(f64::INFINITY, f64::min);

        Some(Self {
            average_ms: round_to(sum / samples_ms.len() as f64, 2),
            min_ms: round_to(min, 2),
            passes: samples_ms.len(),
        })
    }
}
