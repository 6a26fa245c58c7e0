//! Packet duplication onto backup links.
//!
//! Emergency flows duplicate every packet onto two backups, Critical flows
//! every second packet onto one, Normal flows every fourth packet onto one.
//! Backups are the links following the primary in cyclic order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{FlowId, LinkId, Tier};

/// Duplication configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuplicationConfig {
    /// Enable backup copies.
    #[serde(default)]
    pub enabled: bool,
}

/// How a tier is duplicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicationPolicy {
    /// Duplicate one packet out of every `every`.
    pub every: u64,
    /// Backup copies per duplicated packet.
    pub copies: usize,
}

impl DuplicationPolicy {
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Emergency => Self { every: 1, copies: 2 },
            Tier::Critical => Self { every: 2, copies: 1 },
            Tier::Normal => Self { every: 4, copies: 1 },
        }
    }
}

#[derive(Debug, Clone)]
pub struct DuplicationPlanner {
    enabled: bool,
    num_links: usize,
    packet_counts: BTreeMap<FlowId, u64>,
}

impl DuplicationPlanner {
    pub fn new(num_links: usize, config: &DuplicationConfig) -> Self {
        Self {
            enabled: config.enabled,
            num_links,
            packet_counts: BTreeMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Backup links for the next packet of `flow` sent on `primary`.
    ///
    /// Every call counts one packet for the flow.
    pub fn plan(&mut self, flow: FlowId, tier: Tier, primary: LinkId) -> Vec<LinkId> {
        if !self.enabled || self.num_links < 2 {
            return Vec::new();
        }

        let count = self.packet_counts.entry(flow).or_insert(0);
        *count += 1;

        let policy = DuplicationPolicy::for_tier(tier);
        if *count % policy.every != 0 {
            return Vec::new();
        }

        let copies = policy.copies.min(self.num_links - 1);
        (1..=copies)
            .map(|i| LinkId(((primary.index() + i) % self.num_links) as u8))
            .collect()
    }
}
