//! Aggregated run report.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::link::LinkQualityMonitor;
use super::sla::SlaDeviationMonitor;
use super::NO_DATA;
use crate::error::{Error, Result};

/// Snapshot of aggregate link and SLA figures.
///
/// Ratios are percentages. `None` means no packets of that class were seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub strategy: String,

    pub overall_pdr: Option<f64>,
    pub critical_pdr: Option<f64>,
    pub non_critical_pdr: Option<f64>,

    pub avg_delay_ms: Option<f64>,
    pub critical_avg_delay_ms: Option<f64>,
    pub non_critical_avg_delay_ms: Option<f64>,

    pub mean_jitter_ms: Option<f64>,
    pub throughput_mbps: f64,

    #[serde(with = "humantime_serde")]
    pub avg_recovery_time: Duration,
    pub failures: u32,
    pub recoveries: u32,

    pub overall_sla_deviation: f64,
    pub critical_high_sla_deviation: f64,
    pub critical_basic_sla_deviation: f64,
    pub non_critical_sla_deviation: f64,

    /// Byte share per link in percent.
    pub link_usage: Vec<f64>,
    /// Current throughput per link in Mbps.
    pub link_throughput: Vec<f64>,
}

impl Report {
    /// Collect a report from the monitors.
    pub fn collect(
        strategy: &str,
        links: &LinkQualityMonitor,
        sla: &SlaDeviationMonitor,
        link_usage: Vec<f64>,
    ) -> Self {
        Self {
            strategy: strategy.to_string(),
            overall_pdr: links.overall_pdr(),
            critical_pdr: links.critical_pdr(),
            non_critical_pdr: links.non_critical_pdr(),
            avg_delay_ms: links.overall_avg_delay(),
            critical_avg_delay_ms: links.critical_avg_delay(),
            non_critical_avg_delay_ms: links.non_critical_avg_delay(),
            mean_jitter_ms: links.mean_jitter(),
            throughput_mbps: links.total_throughput_mbps(),
            avg_recovery_time: links.average_recovery_time(),
            failures: links.total_failures(),
            recoveries: links.total_recoveries(),
            overall_sla_deviation: sla.overall_deviation(),
            critical_high_sla_deviation: sla.critical_high_deviation(),
            critical_basic_sla_deviation: sla.critical_basic_deviation(),
            non_critical_sla_deviation: sla.non_critical_deviation(),
            link_usage,
            link_throughput: links.links().iter().map(|l| l.throughput_mbps).collect(),
        }
    }

    /// Render as pretty-printed JSON for a reporting collaborator.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Other(anyhow::anyhow!("Failed to serialize report: {e}")))
    }

    /// Encode an optional figure with the `-1` no-data marker.
    pub fn legacy_value(value: Option<f64>) -> f64 {
        value.unwrap_or(NO_DATA)
    }
}

struct Figure(Option<f64>, &'static str);

impl fmt::Display for Figure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v:.2}{}", self.1),
            None => f.write_str("n/a"),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Strategy: {}", self.strategy)?;
        writeln!(
            f,
            "  PDR            overall {}  critical {}  non-critical {}",
            Figure(self.overall_pdr, "%"),
            Figure(self.critical_pdr, "%"),
            Figure(self.non_critical_pdr, "%"),
        )?;
        writeln!(
            f,
            "  Delay          overall {}  critical {}  non-critical {}",
            Figure(self.avg_delay_ms, "ms"),
            Figure(self.critical_avg_delay_ms, "ms"),
            Figure(self.non_critical_avg_delay_ms, "ms"),
        )?;
        writeln!(
            f,
            "  Jitter {}  Throughput {:.2}Mbps  Recovery {:?} ({} failures, {} recoveries)",
            Figure(self.mean_jitter_ms, "ms"),
            self.throughput_mbps,
            self.avg_recovery_time,
            self.failures,
            self.recoveries,
        )?;
        writeln!(
            f,
            "  SLA deviation  overall {:.2}%  critical-high {:.2}%  critical-basic {:.2}%  non-critical {:.2}%",
            self.overall_sla_deviation,
            self.critical_high_sla_deviation,
            self.critical_basic_sla_deviation,
            self.non_critical_sla_deviation,
        )?;
        for (i, (usage, tput)) in self
            .link_usage
            .iter()
            .zip(self.link_throughput.iter())
            .enumerate()
        {
            writeln!(f, "  Link {i}: {usage:.1}% of bytes, {tput:.2}Mbps")?;
        }
        Ok(())
    }
}
