//! Link quality monitor behaviour driven through the public API.
//!
//! Covers the bounded outcome window, delay smoothing, the failure/recovery
//! state machine and snapshot persistence.

use std::time::Duration;

use mlo_core::metrics::{LinkMetrics, LinkQualityMonitor, MonitorConfig, DELAY_EWMA_ALPHA};
use mlo_core::{FlowId, LinkId, PacketEvent};

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

fn delivered(link: u8, t: u64, delay: f64) -> PacketEvent {
    PacketEvent::delivered(LinkId(link), FlowId(3), ms(t), 1200, delay)
}

fn lost(link: u8, t: u64) -> PacketEvent {
    PacketEvent::lost(LinkId(link), FlowId(3), ms(t), 1200)
}

fn monitor() -> LinkQualityMonitor {
    LinkQualityMonitor::new(3, MonitorConfig::default())
}

// ============================================================================
// Delivery ratio
// ============================================================================

#[test]
fn test_outcome_window_bounded() {
    let mut m = monitor();
    let mut t = 0;
    for _ in 0..60 {
        m.record(&lost(0, t), false).unwrap();
        t += 1;
    }
    for _ in 0..50 {
        m.record(&delivered(0, t, 2.0), false).unwrap();
        t += 1;
    }

    let link = m.link(LinkId(0)).unwrap();
    assert_eq!(link.outcomes.len(), 50);
    assert_eq!(link.windowed_pdr(), Some(1.0));
    assert!((link.pdr() - 50.0 / 110.0).abs() < 1e-12);
    assert_eq!(link.packets_transmitted, 110);
    assert_eq!(link.packets_dropped, 60);
}

#[test]
fn test_pdr_never_exceeds_one() {
    let mut m = monitor();
    for t in 0..20 {
        m.record(&delivered(1, t, 1.0), true).unwrap();
        let link = m.link(LinkId(1)).unwrap();
        assert!(link.pdr() <= 1.0);
        assert!(link.packets_received <= link.packets_transmitted);
    }
    assert_eq!(m.overall_pdr(), Some(100.0));
    assert_eq!(m.critical_pdr(), Some(100.0));
    assert_eq!(m.non_critical_pdr(), None);
}

#[test]
fn test_pending_then_outcome_counts_one_transmission() {
    let mut m = monitor();
    for t in 0..5 {
        m.record(
            &PacketEvent::pending(LinkId(2), FlowId(0), ms(t * 2), 500),
            false,
        )
        .unwrap();
        m.record(&delivered(2, t * 2 + 1, 3.0), false).unwrap();
    }

    let link = m.link(LinkId(2)).unwrap();
    assert_eq!(link.packets_transmitted, 5);
    assert_eq!(link.packets_received, 5);
    assert_eq!(link.awaiting_outcome, 0);
    assert!((link.pdr() - 1.0).abs() < f64::EPSILON);
}

// ============================================================================
// Delay smoothing
// ============================================================================

#[test]
fn test_ewma_converges_to_constant_delay() {
    let mut m = monitor();
    m.record(&delivered(0, 0, 100.0), false).unwrap();

    let target = 10.0;
    let epsilon = 0.01;
    let initial_error: f64 = 100.0 - target;
    let needed = ((epsilon / initial_error).ln() / (1.0 - DELAY_EWMA_ALPHA).ln()).ceil() as u64;

    for i in 1..=needed {
        m.record(&delivered(0, i, target), false).unwrap();
    }

    let avg = m.link(LinkId(0)).unwrap().avg_delay_ms.unwrap();
    assert!(
        (avg - target).abs() <= epsilon,
        "EWMA {avg} not within {epsilon} of {target} after {needed} samples"
    );
}

#[test]
fn test_jitter_from_delay_differences() {
    let mut m = monitor();
    for (t, d) in [2.0, 4.0, 2.0, 4.0].into_iter().enumerate() {
        m.record(&delivered(1, t as u64, d), false).unwrap();
    }
    let link = m.link(LinkId(1)).unwrap();
    assert!((link.jitter_ms - 2.0).abs() < 1e-12);
    assert_eq!(m.mean_jitter(), Some(2.0));
}

// ============================================================================
// Failure and recovery
// ============================================================================

#[test]
fn test_failure_and_recovery_fire_once_each() {
    let mut m = monitor();

    // 10 losses arm detection and trip the threshold on the 10th.
    for t in 0..10 {
        m.record(&lost(0, t), false).unwrap();
    }
    let link = m.link(LinkId(0)).unwrap();
    assert!(link.in_failure);
    assert_eq!(link.failure_start, Some(ms(9)));

    // The window holds 50 outcomes; 5 losses leave it at exactly 90%, which
    // happens on the 45th delivery (t = 54 ms).
    for i in 0..100 {
        m.record(&delivered(0, 10 + i, 1.0), false).unwrap();
        let link = m.link(LinkId(0)).unwrap();
        if i < 44 {
            assert!(link.in_failure, "recovered early at delivery {i}");
        } else {
            assert!(!link.in_failure);
        }
    }

    let link = m.link(LinkId(0)).unwrap();
    assert_eq!(link.failure_count, 1);
    assert_eq!(link.recovery_count, 1);
    assert_eq!(link.recovery_times, vec![ms(45)]);
    assert_eq!(link.failure_start, None);
    assert_eq!(m.average_recovery_time(), ms(45));
    assert_eq!(m.total_failures(), 1);
    assert_eq!(m.total_recoveries(), 1);
}

#[test]
fn test_failures_isolated_per_link() {
    let mut m = monitor();
    for t in 0..20 {
        m.record(&lost(2, t), false).unwrap();
        m.record(&delivered(1, t, 1.0), false).unwrap();
    }
    assert!(m.link(LinkId(2)).unwrap().in_failure);
    assert!(!m.link(LinkId(1)).unwrap().in_failure);
    assert_eq!(m.total_failures(), 1);
}

// ============================================================================
// Throughput
// ============================================================================

#[test]
fn test_throughput_over_covered_span() {
    let mut m = monitor();
    // 1250 bytes every 10 ms is 1 Mbps.
    for i in 0..50 {
        m.record(
            &PacketEvent::delivered(LinkId(0), FlowId(0), ms(i * 10), 1250, 1.0),
            false,
        )
        .unwrap();
    }
    let link = m.link(LinkId(0)).unwrap();
    // 50 packets over the 490 ms they span.
    let expected = 50.0 * 1250.0 * 8.0 / 0.49 / 1e6;
    assert!((link.throughput_mbps - expected).abs() < 1e-9);
    assert!((m.total_throughput_mbps() - expected).abs() < 1e-9);
}

// ============================================================================
// Snapshots
// ============================================================================

#[test]
fn test_snapshot_json_round_trip_and_replay() {
    let mut original = monitor();
    for t in 0..30 {
        let event = if t % 4 == 0 {
            lost((t % 3) as u8, t)
        } else {
            delivered((t % 3) as u8, t, 1.5 + (t % 5) as f64)
        };
        original.record(&event, t % 2 == 0).unwrap();
    }

    let json = serde_json::to_string(&original.snapshot()).unwrap();
    let restored: Vec<LinkMetrics> = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, original.snapshot());

    let mut replayed = LinkQualityMonitor::from_snapshot(MonitorConfig::default(), restored).unwrap();
    for t in 30..60 {
        let event = if t % 7 == 0 {
            lost((t % 3) as u8, t)
        } else {
            delivered((t % 3) as u8, t, 2.0)
        };
        original.record(&event, false).unwrap();
        replayed.record(&event, false).unwrap();
    }

    assert_eq!(replayed.snapshot(), original.snapshot());
    assert_eq!(replayed.overall_pdr(), original.overall_pdr());
}

#[test]
fn test_rejected_events_leave_state_untouched() {
    let mut m = monitor();
    m.record(&delivered(0, 100, 1.0), false).unwrap();
    let before = m.snapshot();

    assert!(m.record(&delivered(5, 200, 1.0), false).is_err());
    assert!(m.record(&delivered(0, 50, 1.0), false).is_err());
    assert!(m.record(&delivered(0, 200, 20_000.0), false).is_err());
    assert!(m.record(&delivered(0, 200, f64::NAN), false).is_err());

    assert_eq!(m.snapshot(), before);
}
