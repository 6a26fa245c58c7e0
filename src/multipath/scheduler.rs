//! Packet scheduler.
//!
//! Wraps the active strategy with the state every strategy shares: the link
//! bands, tier counts and per-link byte load. Outcomes are forwarded to the
//! monitors, then to the strategy, and a per-packet reliability score is
//! produced for diagnostics.

use std::fmt;

use super::scoring::link_score;
use super::strategy::{LinkSelector, SelectionContext, Strategy, StrategyConfig};
use crate::classifier::TierCounts;
use crate::error::{Error, Result};
use crate::metrics::{LinkQualityMonitor, SlaContract, SlaDeviationMonitor, MAX_REALISTIC_DELAY_MS};
use crate::types::{FlowId, FrequencyBand, LinkId, Outcome, PacketEvent};

/// Monitors a scheduler forwards outcomes to. Either may be absent.
#[derive(Debug, Default)]
pub struct Monitors<'a> {
    pub links: Option<&'a mut LinkQualityMonitor>,
    pub sla: Option<&'a mut SlaDeviationMonitor>,
}

/// Packet scheduler.
pub struct Scheduler {
    strategy: Strategy,
    bands: Vec<FrequencyBand>,
    tiers: TierCounts,
    /// Bytes attempted per link.
    load: Vec<u64>,
    /// Transmit records per link still waiting for an outcome.
    awaiting: Vec<u64>,
}

impl Scheduler {
    /// Create a scheduler running the configured strategy.
    pub fn new(config: &StrategyConfig, bands: Vec<FrequencyBand>, tiers: TierCounts) -> Self {
        Self::with_strategy(Strategy::from_config(config), bands, tiers)
    }

    /// Create a scheduler around an existing strategy.
    pub fn with_strategy(strategy: Strategy, bands: Vec<FrequencyBand>, tiers: TierCounts) -> Self {
        let n = bands.len();
        Self {
            strategy,
            bands,
            tiers,
            load: vec![0; n],
            awaiting: vec![0; n],
        }
    }

    pub fn num_links(&self) -> usize {
        self.bands.len()
    }

    pub fn bands(&self) -> &[FrequencyBand] {
        &self.bands
    }

    pub fn tiers(&self) -> TierCounts {
        self.tiers
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Label attached to SLA samples.
    pub fn label(&self) -> &'static str {
        self.strategy.label()
    }

    /// Configuration summary.
    pub fn describe(&self) -> String {
        self.strategy
            .describe(&self.bands, self.tiers.emergency, self.tiers.critical)
    }

    /// Tell the strategy which contract a flow is bound to.
    pub fn register_flow(&mut self, flow: FlowId, contract: &SlaContract) {
        self.strategy.register_flow(flow, contract);
    }

    /// Choose a link for the next packet of `flow`.
    pub fn select_link(
        &mut self,
        flow: FlowId,
        is_critical: bool,
        links: Option<&LinkQualityMonitor>,
    ) -> LinkId {
        if self.bands.is_empty() {
            return LinkId(0);
        }

        let ctx = SelectionContext {
            flow,
            tier: self.tiers.tier(flow),
            is_critical,
            bands: &self.bands,
            loads: &self.load,
            links,
        };
        let link = self.strategy.select(&ctx);

        if link.is_valid(self.bands.len()) {
            link
        } else {
            tracing::warn!(
                flow = %flow,
                link = %link,
                strategy = self.strategy.label(),
                "Strategy chose a nonexistent link, using link 0"
            );
            LinkId(0)
        }
    }

    /// Apply one packet event.
    ///
    /// The event goes to the link monitor, then (for outcomes) to the SLA
    /// monitor, then to the strategy. Returns the reliability score of the
    /// link after the update when a link monitor is attached. A rejected
    /// event leaves every piece of state untouched.
    pub fn update_link_metrics(
        &mut self,
        event: &PacketEvent,
        monitors: Monitors<'_>,
    ) -> Result<Option<f64>> {
        if let Err(e) = self.check(event, monitors.sla.as_deref()) {
            tracing::warn!(
                link = %event.link,
                flow = %event.flow,
                error = %e,
                "Rejected packet event"
            );
            return Err(e);
        }

        let critical = event
            .critical
            .unwrap_or_else(|| self.tiers.is_critical(event.flow));

        let mut links = monitors.links;
        if let Some(monitor) = links.as_deref_mut() {
            monitor.record(event, critical)?;
        }

        if !event.outcome.is_pending() {
            if let Some(sla) = monitors.sla {
                let delay = event.outcome.delay_ms().unwrap_or(0.0);
                sla.record_sample(
                    event.flow,
                    event.outcome.is_success(),
                    delay,
                    event.timestamp,
                    self.strategy.label(),
                )?;
            }
        }

        self.account_load(event);
        self.strategy.observe(event);

        let score = links.as_deref().and_then(|monitor| {
            let metrics = monitor.link(event.link)?;
            Some(link_score(metrics, self.tiers.tier(event.flow)))
        });
        if let Some(score) = score {
            tracing::trace!(
                flow = %event.flow,
                link = %event.link,
                critical,
                success = event.outcome.is_success(),
                score,
                "Reliability score"
            );
        }

        Ok(score)
    }

    fn check(&self, event: &PacketEvent, sla: Option<&SlaDeviationMonitor>) -> Result<()> {
        if !event.link.is_valid(self.bands.len()) {
            return Err(Error::InvalidLink {
                link: event.link,
                num_links: self.bands.len(),
            });
        }
        if let Outcome::Delivered { delay_ms } = event.outcome {
            if !(0.0..=MAX_REALISTIC_DELAY_MS).contains(&delay_ms) {
                return Err(Error::UnrealisticDelay(delay_ms));
            }
        }
        if let (Some(sla), false) = (sla, event.outcome.is_pending()) {
            sla.check_order(event.flow, event.timestamp)?;
        }
        Ok(())
    }

    fn account_load(&mut self, event: &PacketEvent) {
        let i = event.link.index();
        match event.outcome {
            Outcome::Pending => {
                self.load[i] += u64::from(event.bytes);
                self.awaiting[i] += 1;
            }
            _ if self.awaiting[i] > 0 => self.awaiting[i] -= 1,
            _ => self.load[i] += u64::from(event.bytes),
        }
    }

    /// Bytes attempted per link.
    pub fn link_loads(&self) -> &[u64] {
        &self.load
    }

    /// Share of attempted bytes per link, in percent.
    pub fn link_usage(&self) -> Vec<f64> {
        let total: u64 = self.load.iter().sum();
        self.load
            .iter()
            .map(|bytes| {
                if total == 0 {
                    0.0
                } else {
                    *bytes as f64 / total as f64 * 100.0
                }
            })
            .collect()
    }

    /// Current throughput per link in Mbps, zero without a monitor.
    pub fn link_throughput(&self, links: Option<&LinkQualityMonitor>) -> Vec<f64> {
        (0..self.bands.len())
            .map(|i| {
                links
                    .and_then(|m| m.link(LinkId(i as u8)))
                    .map_or(0.0, |l| l.throughput_mbps)
            })
            .collect()
    }
}

// Intentionally abbreviated Debug output - per-link counters are exposed via accessors
#[allow(clippy::missing_fields_in_debug)]
impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("strategy", &self.strategy.label())
            .field("links", &self.bands.len())
            .finish()
    }
}
