//! Flow classification.
//!
//! Tiers are derived from the configured emergency/critical counts only:
//! TIDs `[0, e)` are Emergency, `[e, e + c)` are Critical, the rest Normal.
//! The access category of a TID never feeds back into criticality, so a
//! configuration with zero emergency and zero critical TIDs has no critical
//! traffic at all.

use serde::{Deserialize, Serialize};

use crate::types::{AccessCategory, FlowId, Tier};

/// Result of classifying a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub tier: Tier,
    pub is_critical: bool,
}

/// Classify a flow by its TID.
pub fn classify(flow: FlowId, emergency_count: u32, critical_count: u32) -> Classification {
    let tid = flow.as_u32();
    let tier = if tid < emergency_count {
        Tier::Emergency
    } else if tid < emergency_count.saturating_add(critical_count) {
        Tier::Critical
    } else {
        Tier::Normal
    };

    Classification {
        tier,
        is_critical: tier.is_critical(),
    }
}

/// IEEE 802.11 user-priority to access-category map.
///
/// TIDs above 7 wrap onto the eight user priorities.
pub fn access_category(flow: FlowId) -> AccessCategory {
    match flow.0 % 8 {
        1 | 2 => AccessCategory::Background,
        0 | 3 => AccessCategory::BestEffort,
        4 | 5 => AccessCategory::Video,
        _ => AccessCategory::Voice,
    }
}

/// Scheduling priority: 3 for Emergency, 2 for Critical, otherwise the AC index.
pub fn priority_level(flow: FlowId, emergency_count: u32, critical_count: u32) -> u8 {
    match classify(flow, emergency_count, critical_count).tier {
        Tier::Emergency => 3,
        Tier::Critical => 2,
        Tier::Normal => access_category(flow).index(),
    }
}

/// Classifier bound to a fixed pair of tier counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub emergency: u32,
    pub critical: u32,
}

impl TierCounts {
    pub fn new(emergency: u32, critical: u32) -> Self {
        Self {
            emergency,
            critical,
        }
    }

    pub fn classify(self, flow: FlowId) -> Classification {
        classify(flow, self.emergency, self.critical)
    }

    pub fn tier(self, flow: FlowId) -> Tier {
        self.classify(flow).tier
    }

    pub fn is_critical(self, flow: FlowId) -> bool {
        self.classify(flow).is_critical
    }

    pub fn priority_level(self, flow: FlowId) -> u8 {
        priority_level(flow, self.emergency, self.critical)
    }
}
