//! SLA contracts and per-flow deviation accounting.
//!
//! Every flow is bound to one of three contracts the first time it is seen.
//! Deviation is the percentage by which the flow's running mean delay
//! exceeds the contract threshold. Windowed error percentages are kept as a
//! trend only and never reported as deviation.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{MAX_REALISTIC_DELAY_MS, MIN_SLA_DELAY_MS};
use crate::classifier::TierCounts;
use crate::error::{Error, Result};
use crate::types::{FlowId, Tier};

/// Windowed error percentages retained per flow.
pub const ERROR_HISTORY_LEN: usize = 10;

/// Contract level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractLevel {
    /// 1 ms / 1% / 10 packets.
    CriticalHigh,
    /// 50 ms / 5% / 10 packets.
    CriticalBasic,
    /// 100 ms / 10% / 10 packets.
    NonCritical,
}

impl ContractLevel {
    pub const ALL: [ContractLevel; 3] = [
        ContractLevel::CriticalHigh,
        ContractLevel::CriticalBasic,
        ContractLevel::NonCritical,
    ];

    /// Contract a tier is bound to by default.
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Emergency => Self::CriticalHigh,
            Tier::Critical => Self::CriticalBasic,
            Tier::Normal => Self::NonCritical,
        }
    }

    pub fn contract(self) -> SlaContract {
        match self {
            Self::CriticalHigh => SlaContract {
                level: self,
                delay_threshold_ms: 1.0,
                error_threshold_pct: 1.0,
                packet_window: 10,
            },
            Self::CriticalBasic => SlaContract {
                level: self,
                delay_threshold_ms: 50.0,
                error_threshold_pct: 5.0,
                packet_window: 10,
            },
            Self::NonCritical => SlaContract {
                level: self,
                delay_threshold_ms: 100.0,
                error_threshold_pct: 10.0,
                packet_window: 10,
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::CriticalHigh => "CriticalHigh",
            Self::CriticalBasic => "CriticalBasic",
            Self::NonCritical => "NonCritical",
        }
    }
}

impl fmt::Display for ContractLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable SLA contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlaContract {
    pub level: ContractLevel,
    pub delay_threshold_ms: f64,
    pub error_threshold_pct: f64,
    pub packet_window: usize,
}

impl SlaContract {
    pub fn name(&self) -> &'static str {
        self.level.name()
    }

    /// Percentage by which `avg_delay_ms` exceeds the delay threshold.
    pub fn deviation(&self, avg_delay_ms: f64) -> f64 {
        ((avg_delay_ms - self.delay_threshold_ms) / self.delay_threshold_ms * 100.0).max(0.0)
    }
}

/// Per-flow SLA state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSlaMetrics {
    pub flow: FlowId,
    pub contract: SlaContract,
    pub is_critical: bool,

    pub total_packets: u64,
    pub packets_exceeding: u64,

    /// Pass/fail flags of the most recent packets.
    pub window: VecDeque<bool>,
    /// Error percentage of each full window, newest last.
    pub error_history: VecDeque<f64>,
    pub current_error_pct: f64,
    pub moving_average_error: f64,

    pub delay_sum_ms: f64,
    pub delay_count: u64,
    pub avg_delay_ms: Option<f64>,

    /// `None` until the first delay sample.
    pub deviation: Option<f64>,

    /// Samples attributed to each strategy label.
    pub source_counts: BTreeMap<String, u64>,

    pub last_sample: Option<Duration>,
}

impl FlowSlaMetrics {
    fn new(flow: FlowId, contract: SlaContract, is_critical: bool) -> Self {
        Self {
            flow,
            contract,
            is_critical,
            total_packets: 0,
            packets_exceeding: 0,
            window: VecDeque::with_capacity(contract.packet_window),
            error_history: VecDeque::with_capacity(ERROR_HISTORY_LEN),
            current_error_pct: 0.0,
            moving_average_error: 0.0,
            delay_sum_ms: 0.0,
            delay_count: 0,
            avg_delay_ms: None,
            deviation: None,
            source_counts: BTreeMap::new(),
            last_sample: None,
        }
    }

    /// Share of all packets that violated the contract, in percent.
    pub fn violation_pct(&self) -> f64 {
        if self.total_packets == 0 {
            0.0
        } else {
            self.packets_exceeding as f64 / self.total_packets as f64 * 100.0
        }
    }

    fn push_compliance(&mut self, compliant: bool) -> Option<f64> {
        self.window.push_back(compliant);
        let size = self.contract.packet_window.max(1);
        if self.window.len() < size {
            return None;
        }

        let exceeding = self.window.iter().filter(|ok| !**ok).count();
        let error_pct = exceeding as f64 / size as f64 * 100.0;

        if self.error_history.len() >= ERROR_HISTORY_LEN {
            self.error_history.pop_front();
        }
        self.error_history.push_back(error_pct);
        self.current_error_pct = error_pct;
        self.moving_average_error =
            self.error_history.iter().sum::<f64>() / self.error_history.len() as f64;

        self.window.pop_front();
        Some(error_pct)
    }

    fn refresh_deviation(&mut self) -> Option<f64> {
        self.deviation = self.avg_delay_ms.map(|avg| self.contract.deviation(avg));
        self.deviation
    }
}

/// Monitor owning the SLA state of every observed flow.
#[derive(Debug, Clone, Default)]
pub struct SlaDeviationMonitor {
    flows: BTreeMap<FlowId, FlowSlaMetrics>,
    tiers: TierCounts,
}

impl SlaDeviationMonitor {
    pub fn new(tiers: TierCounts) -> Self {
        Self {
            flows: BTreeMap::new(),
            tiers,
        }
    }

    /// Bind a flow to a contract.
    ///
    /// With `level == None` the contract follows the flow's tier. A flow that
    /// already has a contract keeps it and the call fails.
    pub fn set_flow_contract(
        &mut self,
        flow: FlowId,
        level: Option<ContractLevel>,
    ) -> Result<SlaContract> {
        if let Some(existing) = self.flows.get(&flow) {
            return Err(Error::ContractAlreadyAssigned {
                flow,
                contract: existing.contract.name().to_string(),
            });
        }
        Ok(self.assign(flow, level))
    }

    fn assign(&mut self, flow: FlowId, level: Option<ContractLevel>) -> SlaContract {
        let class = self.tiers.classify(flow);
        let level = level.unwrap_or_else(|| ContractLevel::for_tier(class.tier));
        let contract = level.contract();

        tracing::info!(
            flow = %flow,
            tier = %class.tier,
            contract = %level,
            "Assigned SLA contract"
        );

        self.flows
            .insert(flow, FlowSlaMetrics::new(flow, contract, class.is_critical));
        contract
    }

    /// Record one delivery outcome for a flow.
    ///
    /// Returns the flow's deviation after the sample.
    pub fn record_sample(
        &mut self,
        flow: FlowId,
        success: bool,
        delay_ms: f64,
        now: Duration,
        source: &str,
    ) -> Result<Option<f64>> {
        if success && (delay_ms.is_nan() || delay_ms > MAX_REALISTIC_DELAY_MS) {
            let e = Error::UnrealisticDelay(delay_ms);
            tracing::warn!(flow = %flow, error = %e, "Rejected SLA sample");
            return Err(e);
        }
        if let Err(e) = self.check_order(flow, now) {
            tracing::warn!(flow = %flow, error = %e, "Rejected SLA sample");
            return Err(e);
        }

        if !self.flows.contains_key(&flow) {
            self.assign(flow, None);
        }
        let Some(metrics) = self.flows.get_mut(&flow) else {
            return Ok(None);
        };

        metrics.last_sample = Some(now);
        metrics.total_packets += 1;
        *metrics.source_counts.entry(source.to_string()).or_insert(0) += 1;

        let compliant = if success {
            let delay = if delay_ms > 0.0 {
                delay_ms
            } else {
                MIN_SLA_DELAY_MS
            };
            metrics.delay_sum_ms += delay;
            metrics.delay_count += 1;
            metrics.avg_delay_ms = Some(metrics.delay_sum_ms / metrics.delay_count as f64);
            delay <= metrics.contract.delay_threshold_ms
        } else {
            false
        };

        if !compliant {
            metrics.packets_exceeding += 1;
        }

        if let Some(error_pct) = metrics.push_compliance(compliant) {
            tracing::trace!(
                flow = %flow,
                contract = %metrics.contract.level,
                error_pct,
                moving_average = metrics.moving_average_error,
                "SLA window closed"
            );
        }

        let deviation = metrics.refresh_deviation();
        if let Some(dev) = deviation.filter(|d| *d > 0.0) {
            tracing::debug!(
                flow = %flow,
                avg_delay_ms = metrics.avg_delay_ms.unwrap_or_default(),
                threshold_ms = metrics.contract.delay_threshold_ms,
                deviation = dev,
                "SLA violation"
            );
        }

        Ok(deviation)
    }

    /// Fail if a sample at `now` would precede the flow's last sample.
    pub fn check_order(&self, flow: FlowId, now: Duration) -> Result<()> {
        match self.flows.get(&flow).and_then(|m| m.last_sample) {
            Some(last) if now < last => Err(Error::OutOfOrder {
                subject: format!("flow {flow}"),
                last,
                got: now,
            }),
            _ => Ok(()),
        }
    }

    /// Current deviation of one flow. `None` for unknown flows or flows
    /// without delay samples.
    pub fn deviation(&self, flow: FlowId) -> Option<f64> {
        self.flows.get(&flow).and_then(|m| m.deviation)
    }

    pub fn flow(&self, flow: FlowId) -> Option<&FlowSlaMetrics> {
        self.flows.get(&flow)
    }

    pub fn flows(&self) -> &BTreeMap<FlowId, FlowSlaMetrics> {
        &self.flows
    }

    pub fn contract(&self, flow: FlowId) -> Option<SlaContract> {
        self.flows.get(&flow).map(|m| m.contract)
    }

    pub fn tiers(&self) -> TierCounts {
        self.tiers
    }

    /// Mean deviation over all flows with delay samples, 0 if none.
    pub fn overall_deviation(&self) -> f64 {
        Self::mean_deviation(self.flows.values())
    }

    /// Mean deviation over flows bound to `level`, 0 if none qualify.
    pub fn deviation_for(&self, level: ContractLevel) -> f64 {
        Self::mean_deviation(self.flows.values().filter(|m| m.contract.level == level))
    }

    pub fn critical_high_deviation(&self) -> f64 {
        self.deviation_for(ContractLevel::CriticalHigh)
    }

    pub fn critical_basic_deviation(&self) -> f64 {
        self.deviation_for(ContractLevel::CriticalBasic)
    }

    pub fn non_critical_deviation(&self) -> f64 {
        self.deviation_for(ContractLevel::NonCritical)
    }

    fn mean_deviation<'a>(flows: impl Iterator<Item = &'a FlowSlaMetrics>) -> f64 {
        let (sum, count) = flows
            .filter_map(|m| m.deviation)
            .fold((0.0, 0u32), |(s, n), d| (s + d, n + 1));
        if count == 0 {
            0.0
        } else {
            sum / f64::from(count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> SlaDeviationMonitor {
        SlaDeviationMonitor::new(TierCounts::new(1, 1))
    }

    fn t(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn test_contract_table() {
        let high = ContractLevel::CriticalHigh.contract();
        assert!((high.delay_threshold_ms - 1.0).abs() < f64::EPSILON);
        assert!((high.error_threshold_pct - 1.0).abs() < f64::EPSILON);
        let basic = ContractLevel::CriticalBasic.contract();
        assert!((basic.delay_threshold_ms - 50.0).abs() < f64::EPSILON);
        let normal = ContractLevel::NonCritical.contract();
        assert!((normal.error_threshold_pct - 10.0).abs() < f64::EPSILON);
        assert!(ContractLevel::ALL.iter().all(|l| l.contract().packet_window == 10));
    }

    #[test]
    fn test_lazy_assignment_by_tier() {
        let mut m = monitor();
        for tid in 0..3 {
            m.record_sample(FlowId(tid), true, 1.0, t(0), "test").unwrap();
        }
        assert_eq!(m.contract(FlowId(0)).unwrap().level, ContractLevel::CriticalHigh);
        assert_eq!(m.contract(FlowId(1)).unwrap().level, ContractLevel::CriticalBasic);
        assert_eq!(m.contract(FlowId(2)).unwrap().level, ContractLevel::NonCritical);
    }

    #[test]
    fn test_contract_is_immutable() {
        let mut m = monitor();
        m.set_flow_contract(FlowId(5), Some(ContractLevel::CriticalBasic))
            .unwrap();
        let err = m
            .set_flow_contract(FlowId(5), Some(ContractLevel::NonCritical))
            .unwrap_err();
        assert!(matches!(err, Error::ContractAlreadyAssigned { .. }));
        assert_eq!(m.contract(FlowId(5)).unwrap().level, ContractLevel::CriticalBasic);
    }

    #[test]
    fn test_deviation_at_threshold_is_zero() {
        let mut m = monitor();
        let dev = m.record_sample(FlowId(1), true, 50.0, t(0), "test").unwrap();
        assert_eq!(dev, Some(0.0));
    }

    #[test]
    fn test_deviation_at_double_threshold() {
        let mut m = monitor();
        let dev = m.record_sample(FlowId(2), true, 200.0, t(0), "test").unwrap();
        assert!((dev.unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_delay_samples_is_none() {
        let mut m = monitor();
        let dev = m.record_sample(FlowId(2), false, 0.0, t(0), "test").unwrap();
        assert_eq!(dev, None);
        assert_eq!(m.deviation(FlowId(2)), None);
        // Flows without delay samples are excluded from aggregates.
        assert!(m.overall_deviation().abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_delay_floored() {
        let mut m = monitor();
        m.record_sample(FlowId(0), true, 0.0, t(0), "test").unwrap();
        let flow = m.flow(FlowId(0)).unwrap();
        assert_eq!(flow.avg_delay_ms, Some(MIN_SLA_DELAY_MS));
        assert_eq!(flow.packets_exceeding, 0);
    }

    #[test]
    fn test_running_mean_not_ewma() {
        let mut m = monitor();
        for (i, d) in [10.0, 20.0, 30.0].into_iter().enumerate() {
            m.record_sample(FlowId(3), true, d, t(i as u64), "test").unwrap();
        }
        assert_eq!(m.flow(FlowId(3)).unwrap().avg_delay_ms, Some(20.0));
    }

    #[test]
    fn test_window_error_history() {
        let mut m = monitor();
        // 10 samples, 3 losses -> first window at 30%
        for i in 0..10u64 {
            m.record_sample(FlowId(3), i >= 3, 5.0, t(i), "test").unwrap();
        }
        let flow = m.flow(FlowId(3)).unwrap();
        assert_eq!(flow.error_history.len(), 1);
        assert!((flow.current_error_pct - 30.0).abs() < 1e-9);
        assert_eq!(flow.window.len(), 9);

        for i in 10..40u64 {
            m.record_sample(FlowId(3), true, 5.0, t(i), "test").unwrap();
        }
        let flow = m.flow(FlowId(3)).unwrap();
        assert_eq!(flow.error_history.len(), ERROR_HISTORY_LEN);
        assert!(flow.current_error_pct.abs() < f64::EPSILON);
        // Window errors never leak into deviation.
        assert_eq!(flow.deviation, Some(0.0));
    }

    #[test]
    fn test_failure_never_compliant() {
        let mut m = monitor();
        m.record_sample(FlowId(3), false, 1.0, t(0), "test").unwrap();
        assert_eq!(m.flow(FlowId(3)).unwrap().packets_exceeding, 1);
    }

    #[test]
    fn test_out_of_order_sample() {
        let mut m = monitor();
        m.record_sample(FlowId(3), true, 1.0, t(10), "test").unwrap();
        let err = m.record_sample(FlowId(3), true, 1.0, t(5), "test").unwrap_err();
        assert!(matches!(err, Error::OutOfOrder { .. }));
        assert_eq!(m.flow(FlowId(3)).unwrap().total_packets, 1);
    }

    #[test]
    fn test_per_contract_aggregates() {
        let mut m = monitor();
        m.record_sample(FlowId(0), true, 2.0, t(0), "a").unwrap(); // 100%
        m.record_sample(FlowId(1), true, 25.0, t(0), "a").unwrap(); // 0%
        m.record_sample(FlowId(2), true, 150.0, t(0), "b").unwrap(); // 50%
        m.record_sample(FlowId(3), true, 50.0, t(0), "b").unwrap(); // 0%

        assert!((m.critical_high_deviation() - 100.0).abs() < 1e-9);
        assert!(m.critical_basic_deviation().abs() < 1e-9);
        assert!((m.non_critical_deviation() - 25.0).abs() < 1e-9);
        assert!((m.overall_deviation() - 37.5).abs() < 1e-9);
    }

    #[test]
    fn test_source_counts() {
        let mut m = monitor();
        m.record_sample(FlowId(3), true, 1.0, t(0), "RoundRobin").unwrap();
        m.record_sample(FlowId(3), true, 1.0, t(1), "RoundRobin").unwrap();
        m.record_sample(FlowId(3), true, 1.0, t(2), "Greedy").unwrap();
        let counts = &m.flow(FlowId(3)).unwrap().source_counts;
        assert_eq!(counts["RoundRobin"], 2);
        assert_eq!(counts["Greedy"], 1);
    }
}
