//! Link mapping strategies.
//!
//! Implements four strategies:
//! - Round-robin (load-agnostic baseline)
//! - Greedy load (least normalized load first)
//! - Reliability-aware (weighted reliability score)
//! - SLA-aware (probabilistic, driven by per-flow delay against contract)
//!
//! Strategies never mutate monitors. They see the link monitor read-only at
//! selection time and observe accepted packet events afterwards.

use std::collections::BTreeMap;
use std::fmt;

use rand::distributions::{Distribution, WeightedIndex};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::scoring::{link_score, link_weight};
use crate::metrics::{LinkQualityMonitor, SlaContract};
use crate::types::{FlowId, FrequencyBand, LinkId, PacketEvent, Tier};

/// Strategy variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Cyclic over all links.
    RoundRobin,
    /// Least normalized byte load.
    GreedyLoad,
    /// Highest weighted reliability score.
    #[default]
    ReliabilityAware,
    /// Randomised, steered by per-flow SLA breach.
    SlaAware,
}

impl StrategyKind {
    /// Label attached to SLA samples produced under this strategy.
    pub fn label(self) -> &'static str {
        match self {
            Self::RoundRobin => "RoundRobin",
            Self::GreedyLoad => "GreedyLoad",
            Self::ReliabilityAware => "ReliabilityAware",
            Self::SlaAware => "SlaAware",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Strategy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Strategy variant.
    #[serde(default)]
    pub kind: StrategyKind,

    /// Seed for randomised strategies.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Weight of the previous per-link delay average in the SLA-aware EWMA.
    #[serde(default = "default_sla_alpha")]
    pub sla_alpha: f64,
}

fn default_seed() -> u64 {
    42
}
fn default_sla_alpha() -> f64 {
    0.8
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            kind: StrategyKind::default(),
            seed: default_seed(),
            sla_alpha: default_sla_alpha(),
        }
    }
}

/// Everything a strategy may look at when choosing a link.
#[derive(Debug, Clone, Copy)]
pub struct SelectionContext<'a> {
    pub flow: FlowId,
    pub tier: Tier,
    pub is_critical: bool,
    /// Band of each link; its length is the number of links.
    pub bands: &'a [FrequencyBand],
    /// Bytes sent per link so far.
    pub loads: &'a [u64],
    pub links: Option<&'a LinkQualityMonitor>,
}

impl SelectionContext<'_> {
    pub fn num_links(&self) -> usize {
        self.bands.len()
    }
}

/// Capability shared by every strategy.
pub trait LinkSelector {
    /// Label attached to SLA samples.
    fn label(&self) -> &'static str;

    /// Choose a link. Must return an index below `ctx.num_links()`.
    fn select(&mut self, ctx: &SelectionContext<'_>) -> LinkId;

    /// Observe an accepted packet event.
    fn observe(&mut self, _event: &PacketEvent) {}

    /// Learn the contract a flow is bound to.
    fn register_flow(&mut self, _flow: FlowId, _contract: &SlaContract) {}
}

// ============================================================================
// Round-robin
// ============================================================================

/// Stateless-in-quality cyclic selection.
#[derive(Debug, Clone, Default)]
pub struct RoundRobin {
    next: usize,
}

impl LinkSelector for RoundRobin {
    fn label(&self) -> &'static str {
        StrategyKind::RoundRobin.label()
    }

    fn select(&mut self, ctx: &SelectionContext<'_>) -> LinkId {
        let n = ctx.num_links().max(1);
        let link = self.next % n;
        self.next = (link + 1) % n;
        LinkId(link as u8)
    }
}

// ============================================================================
// Greedy load
// ============================================================================

/// Picks the link with the least bytes relative to its nominal capacity.
#[derive(Debug, Clone, Default)]
pub struct GreedyLoad;

impl GreedyLoad {
    /// Load of each link as bits sent over nominal capacity.
    pub fn normalized_loads(loads: &[u64], bands: &[FrequencyBand]) -> Vec<f64> {
        bands
            .iter()
            .enumerate()
            .map(|(i, band)| {
                let bytes = loads.get(i).copied().unwrap_or(0);
                bytes as f64 * 8.0 / band.capacity_bps()
            })
            .collect()
    }
}

impl LinkSelector for GreedyLoad {
    fn label(&self) -> &'static str {
        StrategyKind::GreedyLoad.label()
    }

    fn select(&mut self, ctx: &SelectionContext<'_>) -> LinkId {
        let loads = Self::normalized_loads(ctx.loads, ctx.bands);
        let mut best = 0;
        let mut min = loads.first().copied().unwrap_or(0.0);
        for (i, load) in loads.iter().enumerate().skip(1) {
            if *load < min {
                min = *load;
                best = i;
            }
        }

        tracing::debug!(flow = %ctx.flow, link = best, loads = ?loads, "Greedy selection");
        LinkId(best as u8)
    }
}

// ============================================================================
// Reliability-aware
// ============================================================================

/// Maximises reliability score times a quality-adjusted band weight.
#[derive(Debug, Clone, Default)]
pub struct ReliabilityAware {
    fallback_cursor: usize,
}

impl ReliabilityAware {
    /// Links ordered by band preference, highest band first.
    pub fn preference_order(bands: &[FrequencyBand]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..bands.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse((bands[i].rank(), i)));
        order
    }
}

impl LinkSelector for ReliabilityAware {
    fn label(&self) -> &'static str {
        StrategyKind::ReliabilityAware.label()
    }

    fn select(&mut self, ctx: &SelectionContext<'_>) -> LinkId {
        let Some(monitor) = ctx.links else {
            let order = Self::preference_order(ctx.bands);
            let link = order
                .get(self.fallback_cursor % order.len().max(1))
                .copied()
                .unwrap_or(0);
            self.fallback_cursor = self.fallback_cursor.wrapping_add(1);
            return LinkId(link as u8);
        };

        let mut best = 0;
        let mut best_score = 0.0;
        for (i, band) in ctx.bands.iter().enumerate() {
            let Some(metrics) = monitor.link(LinkId(i as u8)) else {
                continue;
            };
            let score = link_score(metrics, ctx.tier) * link_weight(*band, metrics);
            if score > best_score {
                best_score = score;
                best = i;
            }
        }

        tracing::debug!(
            flow = %ctx.flow,
            link = best,
            band = %ctx.bands.get(best).copied().unwrap_or_default(),
            score = best_score,
            "Reliability selection"
        );
        LinkId(best as u8)
    }
}

// ============================================================================
// SLA-aware
// ============================================================================

#[derive(Debug, Clone)]
struct SlaFlowState {
    delay_threshold_ms: f64,
    error_threshold_pct: f64,
    followed: u64,
    not_followed: u64,
    avg_delay: BTreeMap<LinkId, f64>,
}

impl SlaFlowState {
    fn breach_pct(&self) -> f64 {
        let total = self.followed + self.not_followed;
        if total == 0 {
            0.0
        } else {
            self.not_followed as f64 / total as f64 * 100.0
        }
    }

    fn delay(&self, link: usize) -> f64 {
        self.avg_delay
            .get(&LinkId(link as u8))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Probabilistic selection steered by per-flow SLA breach.
///
/// While a flow's breach rate is within its contract, links are chosen
/// uniformly. Once it exceeds the contract, links whose smoothed delay is
/// below the threshold are chosen uniformly; if none are, links are weighted
/// by inverse delay.
#[derive(Debug, Clone)]
pub struct SlaAware {
    alpha: f64,
    rng: ChaCha8Rng,
    flows: BTreeMap<FlowId, SlaFlowState>,
    fallback: RoundRobin,
}

impl SlaAware {
    pub fn new(alpha: f64, seed: u64) -> Self {
        Self {
            alpha,
            rng: ChaCha8Rng::seed_from_u64(seed),
            flows: BTreeMap::new(),
            fallback: RoundRobin::default(),
        }
    }

    /// Breach percentage of a registered flow.
    pub fn breach_pct(&self, flow: FlowId) -> Option<f64> {
        self.flows.get(&flow).map(SlaFlowState::breach_pct)
    }

    /// Smoothed delay of a flow on a link, 0 before the first sample.
    pub fn link_delay(&self, flow: FlowId, link: LinkId) -> Option<f64> {
        self.flows.get(&flow).map(|s| s.delay(link.index()))
    }

    /// Selection probabilities for a registered flow over `num_links` links.
    pub fn probabilities(&self, flow: FlowId, num_links: usize) -> Option<Vec<f64>> {
        let state = self.flows.get(&flow)?;
        let n = num_links.max(1);
        let uniform = vec![1.0 / n as f64; n];

        if state.breach_pct() <= state.error_threshold_pct {
            return Some(uniform);
        }

        let below: Vec<usize> = (0..n)
            .filter(|&i| state.delay(i) < state.delay_threshold_ms)
            .collect();
        if !below.is_empty() {
            let mut probs = vec![0.0; n];
            for &i in &below {
                probs[i] = 1.0 / below.len() as f64;
            }
            return Some(probs);
        }

        let inv_sum: f64 = (0..n)
            .map(|i| state.delay(i))
            .filter(|d| *d > 0.0)
            .map(|d| 1.0 / d)
            .sum();
        if inv_sum <= 0.0 {
            return Some(uniform);
        }

        Some(
            (0..n)
                .map(|i| {
                    let d = state.delay(i);
                    if d > 0.0 {
                        (1.0 / d) / inv_sum
                    } else {
                        1.0 / n as f64
                    }
                })
                .collect(),
        )
    }
}

impl LinkSelector for SlaAware {
    fn label(&self) -> &'static str {
        StrategyKind::SlaAware.label()
    }

    fn select(&mut self, ctx: &SelectionContext<'_>) -> LinkId {
        let n = ctx.num_links();
        let Some(probs) = self.probabilities(ctx.flow, n) else {
            return self.fallback.select(ctx);
        };

        let link = match WeightedIndex::new(&probs) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => n.saturating_sub(1),
        };

        tracing::debug!(flow = %ctx.flow, link, probabilities = ?probs, "SLA-aware selection");
        LinkId(link as u8)
    }

    fn observe(&mut self, event: &PacketEvent) {
        let Some(delay) = event.outcome.delay_ms().filter(|d| *d > 0.0) else {
            return;
        };
        let Some(state) = self.flows.get_mut(&event.flow) else {
            return;
        };

        let alpha = self.alpha;
        state
            .avg_delay
            .entry(event.link)
            .and_modify(|avg| *avg = *avg * alpha + delay * (1.0 - alpha))
            .or_insert(delay);

        if delay <= state.delay_threshold_ms {
            state.followed += 1;
        } else {
            state.not_followed += 1;
        }
    }

    fn register_flow(&mut self, flow: FlowId, contract: &SlaContract) {
        self.flows.entry(flow).or_insert_with(|| SlaFlowState {
            delay_threshold_ms: contract.delay_threshold_ms,
            error_threshold_pct: contract.error_threshold_pct,
            followed: 0,
            not_followed: 0,
            avg_delay: BTreeMap::new(),
        });
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Strategy in use, dispatched by variant.
pub enum Strategy {
    RoundRobin(RoundRobin),
    GreedyLoad(GreedyLoad),
    ReliabilityAware(ReliabilityAware),
    SlaAware(SlaAware),
    /// Any other implementation of [`LinkSelector`].
    Custom(Box<dyn LinkSelector + Send>),
}

impl Strategy {
    /// Build the configured strategy.
    pub fn from_config(config: &StrategyConfig) -> Self {
        match config.kind {
            StrategyKind::RoundRobin => Self::RoundRobin(RoundRobin::default()),
            StrategyKind::GreedyLoad => Self::GreedyLoad(GreedyLoad),
            StrategyKind::ReliabilityAware => Self::ReliabilityAware(ReliabilityAware::default()),
            StrategyKind::SlaAware => Self::SlaAware(SlaAware::new(config.sla_alpha, config.seed)),
        }
    }

    /// Built-in variant, `None` for custom selectors.
    pub fn kind(&self) -> Option<StrategyKind> {
        match self {
            Self::RoundRobin(_) => Some(StrategyKind::RoundRobin),
            Self::GreedyLoad(_) => Some(StrategyKind::GreedyLoad),
            Self::ReliabilityAware(_) => Some(StrategyKind::ReliabilityAware),
            Self::SlaAware(_) => Some(StrategyKind::SlaAware),
            Self::Custom(_) => None,
        }
    }

    /// One-line configuration summary.
    pub fn describe(&self, bands: &[FrequencyBand], emergency: u32, critical: u32) -> String {
        let bands: Vec<String> = bands.iter().map(ToString::to_string).collect();
        format!(
            "{} over {} links [{}] | emergency TIDs: {emergency} | critical TIDs: {critical}",
            self.label(),
            bands.len(),
            bands.join(", "),
        )
    }

    fn selector(&self) -> &dyn LinkSelector {
        match self {
            Self::RoundRobin(s) => s,
            Self::GreedyLoad(s) => s,
            Self::ReliabilityAware(s) => s,
            Self::SlaAware(s) => s,
            Self::Custom(s) => s.as_ref(),
        }
    }

    fn selector_mut(&mut self) -> &mut dyn LinkSelector {
        match self {
            Self::RoundRobin(s) => s,
            Self::GreedyLoad(s) => s,
            Self::ReliabilityAware(s) => s,
            Self::SlaAware(s) => s,
            Self::Custom(s) => s.as_mut(),
        }
    }
}

impl LinkSelector for Strategy {
    fn label(&self) -> &'static str {
        self.selector().label()
    }

    fn select(&mut self, ctx: &SelectionContext<'_>) -> LinkId {
        self.selector_mut().select(ctx)
    }

    fn observe(&mut self, event: &PacketEvent) {
        self.selector_mut().observe(event);
    }

    fn register_flow(&mut self, flow: FlowId, contract: &SlaContract) {
        self.selector_mut().register_flow(flow, contract);
    }
}

// Custom selectors are opaque
#[allow(clippy::missing_fields_in_debug)]
impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy")
            .field("label", &self.label())
            .finish()
    }
}
