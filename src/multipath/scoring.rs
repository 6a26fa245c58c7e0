//! Reliability scoring shared by every strategy.

use serde::{Deserialize, Serialize};

use crate::metrics::LinkMetrics;
use crate::types::{FrequencyBand, Tier};

/// Quality targets of a tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    /// Required delivery ratio in `[0, 1]`.
    pub pdr: f64,
    pub latency_ms: f64,
    pub jitter_ms: f64,
}

impl TierThresholds {
    pub const EMERGENCY: Self = Self {
        pdr: 0.99,
        latency_ms: 1.0,
        jitter_ms: 0.5,
    };
    pub const CRITICAL: Self = Self {
        pdr: 0.95,
        latency_ms: 50.0,
        jitter_ms: 10.0,
    };
    pub const NORMAL: Self = Self {
        pdr: 0.90,
        latency_ms: 100.0,
        jitter_ms: 20.0,
    };

    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Emergency => Self::EMERGENCY,
            Tier::Critical => Self::CRITICAL,
            Tier::Normal => Self::NORMAL,
        }
    }
}

/// Reliability score in `[0, 1]`.
///
/// Emergency and Critical traffic weighs delivery, delay and jitter
/// 0.6/0.3/0.1. Normal traffic is scored on delivery alone. A non-positive
/// delay means "no sample" and scores perfectly.
pub fn reliability_score(tier: Tier, pdr: f64, delay_ms: f64, jitter_ms: f64) -> f64 {
    let th = TierThresholds::for_tier(tier);
    let pdr_score = pdr / th.pdr;

    let score = if tier.is_critical() {
        let delay_score = if delay_ms > 0.0 {
            (1.0 - delay_ms / th.latency_ms).max(0.0)
        } else {
            1.0
        };
        let jitter_score = (1.0 - jitter_ms / th.jitter_ms).max(0.0);
        0.6 * pdr_score + 0.3 * delay_score + 0.1 * jitter_score
    } else {
        pdr_score
    };

    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Score a link's current state for a tier.
pub fn link_score(metrics: &LinkMetrics, tier: Tier) -> f64 {
    reliability_score(tier, metrics.pdr(), metrics.delay_or_zero(), metrics.jitter_ms)
}

pub const MIN_LINK_WEIGHT: f64 = 0.1;
pub const MAX_LINK_WEIGHT: f64 = 2.0;

/// Band weight adjusted by the link's current delivery, delay and jitter.
pub fn link_weight(band: FrequencyBand, metrics: &LinkMetrics) -> f64 {
    let pdr = metrics.pdr();
    let pdr_factor = if pdr > 0.95 {
        1.2
    } else if pdr > 0.90 {
        1.0
    } else if pdr > 0.80 {
        0.8
    } else {
        0.5
    };

    let delay = metrics.delay_or_zero();
    let delay_factor = if delay <= 1.0 {
        1.1
    } else if delay <= 5.0 {
        1.0
    } else {
        0.7
    };

    let jitter_factor = if metrics.jitter_ms <= 0.5 {
        1.05
    } else if metrics.jitter_ms > 2.0 {
        0.9
    } else {
        1.0
    };

    (band.base_weight() * pdr_factor * delay_factor * jitter_factor)
        .clamp(MIN_LINK_WEIGHT, MAX_LINK_WEIGHT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_is_pdr_only() {
        let score = reliability_score(Tier::Normal, 0.45, 500.0, 100.0);
        assert!((score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_critical_weighted_sum() {
        // 0.6 * 0.5 + 0.3 * (1 - 25/50) + 0.1 * (1 - 5/10)
        let score = reliability_score(Tier::Critical, 0.95 * 0.5, 25.0, 5.0);
        assert!((score - (0.3 + 0.15 + 0.05)).abs() < 1e-12);
    }

    #[test]
    fn test_score_clamped() {
        assert!((reliability_score(Tier::Normal, 1.0, 0.0, 0.0) - 1.0).abs() < f64::EPSILON);
        assert!((reliability_score(Tier::Emergency, 1.0, 0.0, 0.0) - 1.0).abs() < f64::EPSILON);
        // Huge delay and jitter floor their terms at zero.
        let low = reliability_score(Tier::Emergency, 0.0, 1e6, 1e6);
        assert!(low.abs() < f64::EPSILON);
        let neg = reliability_score(Tier::Normal, -1.0, 0.0, 0.0);
        assert!(neg.abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_delay_scores_full() {
        let with_none = reliability_score(Tier::Emergency, 0.99, 0.0, 0.0);
        assert!((with_none - 1.0).abs() < 1e-12);
    }
}
