//! Link quality and SLA accounting.
//!
//! This module provides:
//! - Bounded sliding windows for delivery, delay and throughput
//! - The per-link quality monitor with failure/recovery detection
//! - Per-flow SLA contracts and deviation accounting
//! - An aggregated run report

mod link;
mod report;
mod sla;
mod window;

pub use link::{LinkMetrics, LinkQualityMonitor};
pub use report::Report;
pub use sla::{ContractLevel, FlowSlaMetrics, SlaContract, SlaDeviationMonitor};
pub use window::{DelayWindow, OutcomeWindow, ThroughputWindow};

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Numeric encoding of "no data" for collaborators that cannot carry `Option`.
pub const NO_DATA: f64 = -1.0;

/// EWMA smoothing factor for link delay (1/8).
pub const DELAY_EWMA_ALPHA: f64 = 0.125;

/// Largest delay accepted from the transmission layer, in milliseconds.
pub const MAX_REALISTIC_DELAY_MS: f64 = 10_000.0;

/// Delay substituted for non-positive delivered delays in SLA accounting.
pub const MIN_SLA_DELAY_MS: f64 = 0.1;

/// Link quality monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Windowed PDR below which a link is considered failing.
    #[serde(default = "default_pdr_failure_threshold")]
    pub pdr_failure_threshold: f64,

    /// Capacity of the recent-outcome window.
    #[serde(default = "default_outcome_window")]
    pub outcome_window: usize,

    /// Capacity of the recent-delay window used for jitter.
    #[serde(default = "default_delay_window")]
    pub delay_window: usize,

    /// Samples required in the outcome window before failure detection arms.
    #[serde(default = "default_failure_min_samples")]
    pub failure_min_samples: usize,

    /// Trailing window for throughput.
    #[serde(default = "default_throughput_window", with = "humantime_serde")]
    pub throughput_window: Duration,
}

fn default_pdr_failure_threshold() -> f64 {
    0.90
}
fn default_outcome_window() -> usize {
    50
}
fn default_delay_window() -> usize {
    100
}
fn default_failure_min_samples() -> usize {
    10
}
fn default_throughput_window() -> Duration {
    Duration::from_secs(1)
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            pdr_failure_threshold: default_pdr_failure_threshold(),
            outcome_window: default_outcome_window(),
            delay_window: default_delay_window(),
            failure_min_samples: default_failure_min_samples(),
            throughput_window: default_throughput_window(),
        }
    }
}

/// Fold a sample into an EWMA, seeding with the first sample.
pub(crate) fn ewma(current: Option<f64>, sample: f64, alpha: f64) -> f64 {
    match current {
        Some(avg) => alpha * sample + (1.0 - alpha) * avg,
        None => sample,
    }
}

/// Ratio helper returning `None` on an empty denominator.
pub(crate) fn ratio(num: u64, den: u64) -> Option<f64> {
    if den == 0 {
        None
    } else {
        Some(num as f64 / den as f64)
    }
}
