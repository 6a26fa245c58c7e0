//! Sticky flow-to-link binding for order-sensitive flows.
//!
//! A bound flow keeps its link until it is released, forced off, or its
//! binding ages past the reassignment interval. Critical bindings are never
//! reassigned on age alone.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{FlowId, LinkId};

/// Connection manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Minimum age before a critical binding may be revisited.
    #[serde(default = "default_critical_interval", with = "humantime_serde")]
    pub critical_reassign_interval: Duration,

    /// Age after which a normal binding is reassigned.
    #[serde(default = "default_normal_interval", with = "humantime_serde")]
    pub normal_reassign_interval: Duration,
}

fn default_critical_interval() -> Duration {
    Duration::from_secs(5)
}
fn default_normal_interval() -> Duration {
    Duration::from_secs(2)
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            critical_reassign_interval: default_critical_interval(),
            normal_reassign_interval: default_normal_interval(),
        }
    }
}

/// A flow's current binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub link: LinkId,
    pub assigned_at: Duration,
}

#[derive(Debug, Clone)]
pub struct ConnectionManager {
    config: ConnectionConfig,
    bindings: BTreeMap<FlowId, Binding>,
    per_link: Vec<u32>,
}

impl ConnectionManager {
    pub fn new(num_links: usize, config: ConnectionConfig) -> Self {
        Self {
            config,
            bindings: BTreeMap::new(),
            per_link: vec![0; num_links],
        }
    }

    /// Link for the next packet of a sticky flow.
    ///
    /// `select` is only called when the flow needs a new binding.
    pub fn assign(
        &mut self,
        flow: FlowId,
        is_critical: bool,
        now: Duration,
        force: bool,
        select: impl FnOnce() -> LinkId,
    ) -> LinkId {
        if let Some(binding) = self.bindings.get(&flow) {
            if !force && !self.should_reassign(binding, is_critical, now) {
                return binding.link;
            }
        }

        self.release(flow);
        let link = select();
        if let Some(count) = self.per_link.get_mut(link.index()) {
            *count += 1;
        }
        self.bindings.insert(
            flow,
            Binding {
                link,
                assigned_at: now,
            },
        );

        tracing::debug!(flow = %flow, link = %link, critical = is_critical, "Flow bound to link");
        link
    }

    fn should_reassign(&self, binding: &Binding, is_critical: bool, now: Duration) -> bool {
        let interval = if is_critical {
            self.config.critical_reassign_interval
        } else {
            self.config.normal_reassign_interval
        };
        now.saturating_sub(binding.assigned_at) >= interval && !is_critical
    }

    /// Drop a flow's binding.
    pub fn release(&mut self, flow: FlowId) -> Option<LinkId> {
        let binding = self.bindings.remove(&flow)?;
        if let Some(count) = self.per_link.get_mut(binding.link.index()) {
            *count = count.saturating_sub(1);
        }
        Some(binding.link)
    }

    pub fn assigned_link(&self, flow: FlowId) -> Option<LinkId> {
        self.bindings.get(&flow).map(|b| b.link)
    }

    /// Bound flows per link.
    pub fn connection_counts(&self) -> &[u32] {
        &self.per_link
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
