//! Per-link quality tracking.
//!
//! Each link keeps cumulative counters, a recent-outcome window for a
//! responsive delivery ratio, a recent-delay window for jitter, a trailing
//! throughput window and an edge-triggered failure/recovery state.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::window::{DelayWindow, OutcomeWindow, ThroughputWindow};
use super::{ewma, ratio, MonitorConfig, DELAY_EWMA_ALPHA, MAX_REALISTIC_DELAY_MS};
use crate::error::{Error, Result};
use crate::types::{LinkId, Outcome, PacketEvent};

/// Quality record of one link.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkMetrics {
    pub link: LinkId,

    // Cumulative counters
    pub packets_transmitted: u64,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub bytes_transmitted: u64,
    pub bytes_received: u64,
    pub critical_transmitted: u64,
    pub critical_received: u64,
    pub non_critical_transmitted: u64,
    pub non_critical_received: u64,
    pub duplicates_transmitted: u64,
    pub duplicates_received: u64,

    /// Transmit records still waiting for their outcome.
    pub awaiting_outcome: u64,

    // Delay (EWMA, milliseconds)
    pub avg_delay_ms: Option<f64>,
    pub critical_avg_delay_ms: Option<f64>,
    pub non_critical_avg_delay_ms: Option<f64>,
    pub critical_delay_sum_ms: f64,
    pub critical_delay_count: u64,
    pub non_critical_delay_sum_ms: f64,
    pub non_critical_delay_count: u64,

    pub jitter_ms: f64,
    pub throughput_mbps: f64,

    pub outcomes: OutcomeWindow,
    pub delays: DelayWindow,
    pub throughput: ThroughputWindow,

    // Failure state
    pub in_failure: bool,
    pub failure_start: Option<Duration>,
    pub failure_count: u32,
    pub recovery_count: u32,
    pub recovery_times: Vec<Duration>,

    pub last_event: Option<Duration>,
}

impl LinkMetrics {
    pub fn new(link: LinkId, config: &MonitorConfig) -> Self {
        Self {
            link,
            packets_transmitted: 0,
            packets_received: 0,
            packets_dropped: 0,
            bytes_transmitted: 0,
            bytes_received: 0,
            critical_transmitted: 0,
            critical_received: 0,
            non_critical_transmitted: 0,
            non_critical_received: 0,
            duplicates_transmitted: 0,
            duplicates_received: 0,
            awaiting_outcome: 0,
            avg_delay_ms: None,
            critical_avg_delay_ms: None,
            non_critical_avg_delay_ms: None,
            critical_delay_sum_ms: 0.0,
            critical_delay_count: 0,
            non_critical_delay_sum_ms: 0.0,
            non_critical_delay_count: 0,
            jitter_ms: 0.0,
            throughput_mbps: 0.0,
            outcomes: OutcomeWindow::new(config.outcome_window),
            delays: DelayWindow::new(config.delay_window),
            throughput: ThroughputWindow::new(config.throughput_window),
            in_failure: false,
            failure_start: None,
            failure_count: 0,
            recovery_count: 0,
            recovery_times: Vec::new(),
            last_event: None,
        }
    }

    /// Cumulative delivery ratio in `[0, 1]`; 1.0 before any traffic.
    pub fn pdr(&self) -> f64 {
        ratio(self.packets_received, self.packets_transmitted)
            .map_or(1.0, |r| r.min(1.0))
    }

    /// Delivery ratio over the recent-outcome window.
    pub fn windowed_pdr(&self) -> Option<f64> {
        self.outcomes.ratio()
    }

    /// Delivery ratio of critical traffic.
    pub fn critical_pdr(&self) -> Option<f64> {
        ratio(self.critical_received, self.critical_transmitted)
    }

    /// Delivery ratio of non-critical traffic.
    pub fn non_critical_pdr(&self) -> Option<f64> {
        ratio(self.non_critical_received, self.non_critical_transmitted)
    }

    /// Share of transmissions that were duplicates.
    pub fn duplication_ratio(&self) -> f64 {
        ratio(self.duplicates_transmitted, self.packets_transmitted).unwrap_or(0.0)
    }

    /// EWMA delay, zero before the first delay sample.
    pub fn delay_or_zero(&self) -> f64 {
        self.avg_delay_ms.unwrap_or(0.0)
    }

    /// Mean of the recorded recovery durations.
    pub fn mean_recovery_time(&self) -> Option<Duration> {
        if self.recovery_times.is_empty() {
            return None;
        }
        let total: Duration = self.recovery_times.iter().sum();
        Some(total / self.recovery_times.len() as u32)
    }

    fn count_transmit(&mut self, event: &PacketEvent, critical: bool) {
        self.packets_transmitted += 1;
        self.bytes_transmitted += u64::from(event.bytes);
        if critical {
            self.critical_transmitted += 1;
        } else {
            self.non_critical_transmitted += 1;
        }
        if event.duplicate {
            self.duplicates_transmitted += 1;
        }
    }

    fn record_delivery(&mut self, event: &PacketEvent, critical: bool, delay_ms: f64) {
        self.packets_received += 1;
        self.bytes_received += u64::from(event.bytes);
        if event.duplicate {
            self.duplicates_received += 1;
        }

        if critical {
            self.critical_received += 1;
        } else {
            self.non_critical_received += 1;
        }

        if delay_ms > 0.0 {
            if critical {
                self.critical_delay_sum_ms += delay_ms;
                self.critical_delay_count += 1;
                self.critical_avg_delay_ms =
                    Some(ewma(self.critical_avg_delay_ms, delay_ms, DELAY_EWMA_ALPHA));
            } else {
                self.non_critical_delay_sum_ms += delay_ms;
                self.non_critical_delay_count += 1;
                self.non_critical_avg_delay_ms =
                    Some(ewma(self.non_critical_avg_delay_ms, delay_ms, DELAY_EWMA_ALPHA));
            }

            self.avg_delay_ms = Some(ewma(self.avg_delay_ms, delay_ms, DELAY_EWMA_ALPHA));
            self.delays.push(delay_ms);
            self.jitter_ms = self.delays.jitter();
        }

        if event.bytes > 0 {
            if let Some(rate) = self.throughput.record(event.timestamp, event.bytes) {
                self.throughput_mbps = rate;
            }
        }
    }

    /// Run the failure/recovery state machine. Returns the edge taken, if any.
    fn evaluate_failure(&mut self, now: Duration, config: &MonitorConfig) -> Option<Edge> {
        let window_pdr = self.outcomes.ratio()?;
        let failing = window_pdr < config.pdr_failure_threshold
            && self.outcomes.len() >= config.failure_min_samples;

        if !self.in_failure && failing {
            self.in_failure = true;
            self.failure_start = Some(now);
            self.failure_count += 1;
            Some(Edge::Failed { window_pdr })
        } else if self.in_failure && !failing {
            let started = self.failure_start.take().unwrap_or(now);
            let duration = now.saturating_sub(started);
            self.in_failure = false;
            self.recovery_count += 1;
            self.recovery_times.push(duration);
            Some(Edge::Recovered {
                window_pdr,
                duration,
            })
        } else {
            None
        }
    }
}

// Abbreviated Debug output - windows and class counters are noisy
#[allow(clippy::missing_fields_in_debug)]
impl fmt::Debug for LinkMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkMetrics")
            .field("link", &self.link)
            .field("tx", &self.packets_transmitted)
            .field("rx", &self.packets_received)
            .field("pdr", &self.pdr())
            .field("windowed_pdr", &self.windowed_pdr())
            .field("avg_delay_ms", &self.avg_delay_ms)
            .field("jitter_ms", &self.jitter_ms)
            .field("throughput_mbps", &self.throughput_mbps)
            .field("in_failure", &self.in_failure)
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum Edge {
    Failed { window_pdr: f64 },
    Recovered { window_pdr: f64, duration: Duration },
}

/// Monitor owning one [`LinkMetrics`] per configured link.
#[derive(Debug, Clone)]
pub struct LinkQualityMonitor {
    links: Vec<LinkMetrics>,
    config: MonitorConfig,
}

impl LinkQualityMonitor {
    /// Create a monitor for `num_links` links.
    pub fn new(num_links: usize, config: MonitorConfig) -> Self {
        let links = (0..num_links)
            .map(|i| LinkMetrics::new(LinkId(i as u8), &config))
            .collect();
        Self { links, config }
    }

    /// Rebuild a monitor from a previously taken snapshot.
    pub fn from_snapshot(config: MonitorConfig, links: Vec<LinkMetrics>) -> Result<Self> {
        for (i, metrics) in links.iter().enumerate() {
            if metrics.link.index() != i {
                return Err(Error::InvalidConfig(format!(
                    "snapshot entry {i} belongs to link {}",
                    metrics.link
                )));
            }
        }
        Ok(Self { links, config })
    }

    /// Apply one packet event.
    ///
    /// Invalid events are logged and rejected without touching any state.
    pub fn record(&mut self, event: &PacketEvent, critical: bool) -> Result<()> {
        if let Err(e) = self.check(event) {
            tracing::warn!(
                link = %event.link,
                flow = %event.flow,
                error = %e,
                "Rejected link outcome"
            );
            return Err(e);
        }

        let config = &self.config;
        let metrics = &mut self.links[event.link.index()];
        metrics.last_event = Some(event.timestamp);

        let delay_ms = match event.outcome {
            Outcome::Pending => {
                metrics.count_transmit(event, critical);
                metrics.awaiting_outcome += 1;
                return Ok(());
            }
            Outcome::Delivered { delay_ms } => Some(delay_ms),
            Outcome::Lost => None,
        };

        if metrics.awaiting_outcome > 0 {
            metrics.awaiting_outcome -= 1;
        } else {
            metrics.count_transmit(event, critical);
        }

        metrics.outcomes.push(delay_ms.is_some());
        match delay_ms {
            Some(delay) => metrics.record_delivery(event, critical, delay),
            None => metrics.packets_dropped += 1,
        }

        match metrics.evaluate_failure(event.timestamp, config) {
            Some(Edge::Failed { window_pdr }) => {
                tracing::info!(
                    link = %event.link,
                    at = ?event.timestamp,
                    window_pdr = format_args!("{:.1}%", window_pdr * 100.0),
                    "Link failure detected"
                );
            }
            Some(Edge::Recovered {
                window_pdr,
                duration,
            }) => {
                tracing::info!(
                    link = %event.link,
                    at = ?event.timestamp,
                    recovery = ?duration,
                    window_pdr = format_args!("{:.1}%", window_pdr * 100.0),
                    "Link recovered"
                );
            }
            None => {}
        }

        Ok(())
    }

    fn check(&self, event: &PacketEvent) -> Result<()> {
        let metrics = self.links.get(event.link.index()).ok_or(Error::InvalidLink {
            link: event.link,
            num_links: self.links.len(),
        })?;

        if let Outcome::Delivered { delay_ms } = event.outcome {
            if !(0.0..=MAX_REALISTIC_DELAY_MS).contains(&delay_ms) {
                return Err(Error::UnrealisticDelay(delay_ms));
            }
        }

        if let Some(last) = metrics.last_event {
            if event.timestamp < last {
                return Err(Error::OutOfOrder {
                    subject: format!("link {}", event.link),
                    last,
                    got: event.timestamp,
                });
            }
        }

        Ok(())
    }

    pub fn num_links(&self) -> usize {
        self.links.len()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Metrics of one link.
    pub fn link(&self, link: LinkId) -> Option<&LinkMetrics> {
        self.links.get(link.index())
    }

    /// All links, indexed by link id.
    pub fn links(&self) -> &[LinkMetrics] {
        &self.links
    }

    /// Owned copy of all link records.
    pub fn snapshot(&self) -> Vec<LinkMetrics> {
        self.links.clone()
    }

    /// Mean recovery duration across every recovery on every link.
    pub fn average_recovery_time(&self) -> Duration {
        let (total, count) = self
            .links
            .iter()
            .flat_map(|l| l.recovery_times.iter())
            .fold((Duration::ZERO, 0u32), |(sum, n), d| (sum + *d, n + 1));
        if count == 0 {
            Duration::ZERO
        } else {
            total / count
        }
    }

    pub fn total_failures(&self) -> u32 {
        self.links.iter().map(|l| l.failure_count).sum()
    }

    pub fn total_recoveries(&self) -> u32 {
        self.links.iter().map(|l| l.recovery_count).sum()
    }

    /// Overall delivery ratio in percent across all links.
    pub fn overall_pdr(&self) -> Option<f64> {
        let (rx, tx) = self.sum(|l| (l.packets_received, l.packets_transmitted));
        ratio(rx, tx).map(|r| r * 100.0)
    }

    /// Critical delivery ratio in percent across all links.
    pub fn critical_pdr(&self) -> Option<f64> {
        let (rx, tx) = self.sum(|l| (l.critical_received, l.critical_transmitted));
        ratio(rx, tx).map(|r| r * 100.0)
    }

    /// Non-critical delivery ratio in percent across all links.
    pub fn non_critical_pdr(&self) -> Option<f64> {
        let (rx, tx) = self.sum(|l| (l.non_critical_received, l.non_critical_transmitted));
        ratio(rx, tx).map(|r| r * 100.0)
    }

    /// Arithmetic mean delay of critical deliveries across all links.
    pub fn critical_avg_delay(&self) -> Option<f64> {
        let sum: f64 = self.links.iter().map(|l| l.critical_delay_sum_ms).sum();
        let count: u64 = self.links.iter().map(|l| l.critical_delay_count).sum();
        (count > 0).then(|| sum / count as f64)
    }

    /// Arithmetic mean delay of non-critical deliveries across all links.
    pub fn non_critical_avg_delay(&self) -> Option<f64> {
        let sum: f64 = self.links.iter().map(|l| l.non_critical_delay_sum_ms).sum();
        let count: u64 = self.links.iter().map(|l| l.non_critical_delay_count).sum();
        (count > 0).then(|| sum / count as f64)
    }

    /// Arithmetic mean delay of all deliveries across all links.
    pub fn overall_avg_delay(&self) -> Option<f64> {
        let sum: f64 = self
            .links
            .iter()
            .map(|l| l.critical_delay_sum_ms + l.non_critical_delay_sum_ms)
            .sum();
        let count: u64 = self
            .links
            .iter()
            .map(|l| l.critical_delay_count + l.non_critical_delay_count)
            .sum();
        (count > 0).then(|| sum / count as f64)
    }

    /// Mean jitter over links that have seen at least one delay sample.
    pub fn mean_jitter(&self) -> Option<f64> {
        let active: Vec<f64> = self
            .links
            .iter()
            .filter(|l| !l.delays.is_empty())
            .map(|l| l.jitter_ms)
            .collect();
        if active.is_empty() {
            None
        } else {
            Some(active.iter().sum::<f64>() / active.len() as f64)
        }
    }

    /// Sum of current per-link throughput.
    pub fn total_throughput_mbps(&self) -> f64 {
        self.links.iter().map(|l| l.throughput_mbps).sum()
    }

    fn sum(&self, f: impl Fn(&LinkMetrics) -> (u64, u64)) -> (u64, u64) {
        self.links.iter().map(f).fold((0, 0), |(a, b), (x, y)| (a + x, b + y))
    }
}
