//! Decision core driver.
//!
//! `MultipathManager` owns every piece of mutable state: both monitors, the
//! scheduler, the connection manager and the duplication planner. Events are
//! applied synchronously in call order.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::connection::ConnectionManager;
use super::duplication::DuplicationPlanner;
use super::scheduler::{Monitors, Scheduler};
use super::strategy::Strategy;
use crate::classifier::{Classification, TierCounts};
use crate::config::Config;
use crate::error::Result;
use crate::metrics::{
    ContractLevel, LinkMetrics, LinkQualityMonitor, Report, SlaContract, SlaDeviationMonitor,
};
use crate::types::{Clock, FlowId, LinkId, PacketEvent, Tier};

/// Link choice for one outbound packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispatch {
    pub flow: FlowId,
    pub tier: Tier,
    pub primary: LinkId,
    /// Links that should carry a duplicate copy.
    pub backups: Vec<LinkId>,
}

/// Event counters of the manager itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStats {
    pub accepted: u64,
    pub rejected: u64,
}

pub struct MultipathManager {
    config: Config,
    tiers: TierCounts,
    links: LinkQualityMonitor,
    sla: SlaDeviationMonitor,
    scheduler: Scheduler,
    connections: ConnectionManager,
    duplication: DuplicationPlanner,
    stats: EventStats,
}

impl MultipathManager {
    /// Build the core from configuration with the configured strategy.
    pub fn new(config: Config) -> Result<Self> {
        let strategy = Strategy::from_config(&config.strategy);
        Self::with_strategy(config, strategy)
    }

    /// Build the core around a caller-supplied strategy.
    ///
    /// Fails on an invalid configuration; nothing runs in that case.
    pub fn with_strategy(config: Config, strategy: Strategy) -> Result<Self> {
        config.validate()?;

        let num_links = config.num_links();
        let tiers = TierCounts::new(config.traffic.emergency_tids, config.traffic.critical_tids);
        let links = LinkQualityMonitor::new(num_links, config.monitor.clone());
        let mut sla = SlaDeviationMonitor::new(tiers);
        let mut scheduler = Scheduler::with_strategy(strategy, config.links.bands.clone(), tiers);

        for tid in 0..config.traffic.tid_count {
            let flow = FlowId::try_from(tid)?;
            let contract = sla.set_flow_contract(flow, None)?;
            scheduler.register_flow(flow, &contract);
        }

        let connections = ConnectionManager::new(num_links, config.connections.clone());
        let duplication = DuplicationPlanner::new(num_links, &config.duplication);

        tracing::info!(
            tids = config.traffic.tid_count,
            duplication = duplication.is_enabled(),
            "{}",
            scheduler.describe()
        );

        Ok(Self {
            config,
            tiers,
            links,
            sla,
            scheduler,
            connections,
            duplication,
            stats: EventStats::default(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn num_links(&self) -> usize {
        self.links.num_links()
    }

    pub fn classify(&self, flow: FlowId) -> Classification {
        self.tiers.classify(flow)
    }

    /// Bind a flow to an explicit contract before its first packet.
    pub fn set_flow_contract(&mut self, flow: FlowId, level: ContractLevel) -> Result<SlaContract> {
        let contract = self.sla.set_flow_contract(flow, Some(level))?;
        self.scheduler.register_flow(flow, &contract);
        Ok(contract)
    }

    /// Choose a link for the next packet of `flow`.
    pub fn select_link(&mut self, flow: FlowId) -> LinkId {
        let class = self.tiers.classify(flow);
        self.scheduler
            .select_link(flow, class.is_critical, Some(&self.links))
    }

    /// Like [`select_link`](Self::select_link) for an unchecked TID.
    ///
    /// Out-of-range TIDs are logged and mapped to link 0.
    pub fn select_link_raw(&mut self, tid: u32) -> LinkId {
        match FlowId::try_from(tid) {
            Ok(flow) => self.select_link(flow),
            Err(e) => {
                tracing::warn!(tid, error = %e, "Rejected link selection");
                self.stats.rejected += 1;
                LinkId(0)
            }
        }
    }

    /// Choose a primary link and any duplicate links for the next packet.
    pub fn dispatch(&mut self, flow: FlowId) -> Dispatch {
        let tier = self.tiers.tier(flow);
        let primary = self.select_link(flow);
        let backups = self.duplication.plan(flow, tier, primary);
        Dispatch {
            flow,
            tier,
            primary,
            backups,
        }
    }

    /// Link for a sticky, order-sensitive flow.
    pub fn connection_link(&mut self, flow: FlowId, clock: &dyn Clock, force: bool) -> LinkId {
        let is_critical = self.tiers.is_critical(flow);
        let scheduler = &mut self.scheduler;
        let links = &self.links;
        self.connections
            .assign(flow, is_critical, clock.now(), force, || {
                scheduler.select_link(flow, is_critical, Some(links))
            })
    }

    /// Close a sticky flow.
    pub fn release_connection(&mut self, flow: FlowId) -> Option<LinkId> {
        self.connections.release(flow)
    }

    /// Apply a packet event, returning the per-packet reliability score.
    pub fn try_record(&mut self, event: &PacketEvent) -> Result<Option<f64>> {
        let result = self.scheduler.update_link_metrics(
            event,
            Monitors {
                links: Some(&mut self.links),
                sla: Some(&mut self.sla),
            },
        );
        match result {
            Ok(_) => self.stats.accepted += 1,
            Err(_) => self.stats.rejected += 1,
        }
        result
    }

    /// Apply a packet event, dropping it if it is invalid.
    ///
    /// Rejections are logged by the monitors; processing continues.
    pub fn record(&mut self, event: &PacketEvent) -> Option<f64> {
        self.try_record(event).ok().flatten()
    }

    pub fn link_monitor(&self) -> &LinkQualityMonitor {
        &self.links
    }

    pub fn sla_monitor(&self) -> &SlaDeviationMonitor {
        &self.sla
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn stats(&self) -> EventStats {
        self.stats
    }

    /// Byte share per link in percent.
    pub fn link_usage(&self) -> Vec<f64> {
        self.scheduler.link_usage()
    }

    /// Current throughput per link in Mbps.
    pub fn link_throughput(&self) -> Vec<f64> {
        self.scheduler.link_throughput(Some(&self.links))
    }

    /// Snapshot of every link's metrics.
    pub fn link_snapshot(&self) -> Vec<LinkMetrics> {
        self.links.snapshot()
    }

    /// Replace link metrics with a previously taken snapshot.
    pub fn restore_links(&mut self, snapshot: Vec<LinkMetrics>) -> Result<()> {
        self.links = LinkQualityMonitor::from_snapshot(self.config.monitor.clone(), snapshot)?;
        Ok(())
    }

    /// Aggregate report of the run so far.
    pub fn report(&self) -> Report {
        Report::collect(
            self.scheduler.label(),
            &self.links,
            &self.sla,
            self.scheduler.link_usage(),
        )
    }
}

// Intentionally abbreviated Debug output - monitors have their own accessors
#[allow(clippy::missing_fields_in_debug)]
impl fmt::Debug for MultipathManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipathManager")
            .field("strategy", &self.scheduler.label())
            .field("links", &self.links.num_links())
            .field("flows", &self.sla.flows().len())
            .field("stats", &self.stats)
            .finish()
    }
}
