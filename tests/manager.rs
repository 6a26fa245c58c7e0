//! End-to-end runs of the decision core.
//!
//! Drives `MultipathManager` the way a simulation layer would: classify,
//! select, transmit (synthesised here), record, report.

use std::time::Duration;

use mlo_core::classifier::{classify, priority_level};
use mlo_core::config::LogLevel;
use mlo_core::metrics::{ContractLevel, LinkMetrics, Report};
use mlo_core::multipath::{MultipathManager, StrategyKind};
use mlo_core::{Config, Error, FlowId, FrequencyBand, LinkId, PacketEvent, Tier};

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

fn config(kind: StrategyKind) -> Config {
    let mut config = Config::default();
    config.traffic.tid_count = 4;
    config.traffic.emergency_tids = 1;
    config.traffic.critical_tids = 1;
    config.strategy.kind = kind;
    config
}

/// Synthetic transmission: the outcome depends only on the flow.
fn transmit(link: LinkId, flow: FlowId, t: u64) -> PacketEvent {
    match flow.0 {
        0 => PacketEvent::delivered(link, flow, ms(t), 200, 0.5),
        1 => PacketEvent::delivered(link, flow, ms(t), 800, 20.0),
        2 => PacketEvent::delivered(link, flow, ms(t), 1500, 200.0),
        _ => PacketEvent::lost(link, flow, ms(t), 1500),
    }
}

fn run(manager: &mut MultipathManager, packets: u64) {
    for t in 0..packets {
        let flow = FlowId((t % 4) as u8);
        let link = manager.select_link(flow);
        manager.record(&transmit(link, flow, t));
    }
}

// ============================================================================
// Classification
// ============================================================================

#[test]
fn test_classification_one_emergency_one_critical() {
    let tiers: Vec<_> = (0..4).map(|t| classify(FlowId(t), 1, 1)).collect();
    assert_eq!(tiers[0].tier, Tier::Emergency);
    assert_eq!(tiers[1].tier, Tier::Critical);
    assert_eq!(tiers[2].tier, Tier::Normal);
    assert_eq!(tiers[3].tier, Tier::Normal);
    assert_eq!(
        tiers.iter().map(|c| c.is_critical).collect::<Vec<_>>(),
        vec![true, true, false, false]
    );

    assert_eq!(priority_level(FlowId(0), 1, 1), 3);
    assert_eq!(priority_level(FlowId(1), 1, 1), 2);
}

#[test]
fn test_no_critical_tids_means_no_critical_traffic() {
    let mut config = config(StrategyKind::RoundRobin);
    config.traffic.emergency_tids = 0;
    config.traffic.critical_tids = 0;
    let mut manager = MultipathManager::new(config).unwrap();
    run(&mut manager, 40);

    let report = manager.report();
    assert_eq!(report.critical_pdr, None);
    assert_eq!(report.critical_avg_delay_ms, None);
    assert!((Report::legacy_value(report.critical_pdr) + 1.0).abs() < f64::EPSILON);
    assert!(report.non_critical_pdr.is_some());
}

// ============================================================================
// Full run
// ============================================================================

#[test]
fn test_round_robin_run_report() {
    let mut manager = MultipathManager::new(config(StrategyKind::RoundRobin)).unwrap();
    run(&mut manager, 120);

    let report = manager.report();
    assert_eq!(report.strategy, "RoundRobin");

    // Flows 0 and 1 always deliver, flow 2 delivers, flow 3 never does.
    assert_eq!(report.critical_pdr, Some(100.0));
    assert_eq!(report.non_critical_pdr, Some(50.0));
    assert_eq!(report.overall_pdr, Some(75.0));
    assert_eq!(report.critical_avg_delay_ms, Some(10.25));
    assert_eq!(report.non_critical_avg_delay_ms, Some(200.0));

    // 0.5ms against 1ms and 20ms against 50ms comply; 200ms against 100ms is
    // 100% over. Flow 3 has no delay samples and is left out.
    assert!(report.critical_high_sla_deviation.abs() < 1e-9);
    assert!(report.critical_basic_sla_deviation.abs() < 1e-9);
    assert!((report.non_critical_sla_deviation - 100.0).abs() < 1e-9);
    assert!((report.overall_sla_deviation - 100.0 / 3.0).abs() < 1e-9);

    let sla = manager.sla_monitor();
    assert_eq!(sla.deviation(FlowId(0)), Some(0.0));
    assert_eq!(sla.deviation(FlowId(3)), None);
    assert_eq!(sla.flow(FlowId(2)).unwrap().source_counts["RoundRobin"], 30);

    let usage: f64 = report.link_usage.iter().sum();
    assert!((usage - 100.0).abs() < 1e-9);
    assert_eq!(report.link_throughput.len(), 3);
    assert_eq!(manager.stats().accepted, 120);
    assert_eq!(manager.stats().rejected, 0);

    let json = report.to_json().unwrap();
    let back: Report = serde_json::from_str(&json).unwrap();
    assert_eq!(back, report);
    assert!(report.to_string().contains("Strategy: RoundRobin"));
}

#[test]
fn test_every_strategy_completes_a_run() {
    for kind in [
        StrategyKind::RoundRobin,
        StrategyKind::GreedyLoad,
        StrategyKind::ReliabilityAware,
        StrategyKind::SlaAware,
    ] {
        let mut manager = MultipathManager::new(config(kind)).unwrap();
        run(&mut manager, 200);
        let report = manager.report();
        assert_eq!(report.strategy, kind.label());
        assert_eq!(manager.stats().accepted, 200, "{kind} rejected events");
        assert!(report.overall_pdr.is_some());
    }
}

#[test]
fn test_sla_aware_runs_are_reproducible() {
    let run_once = || {
        let mut manager = MultipathManager::new(config(StrategyKind::SlaAware)).unwrap();
        (0..100)
            .map(|t| {
                let flow = FlowId((t % 4) as u8);
                let link = manager.select_link(flow);
                manager.record(&transmit(link, flow, t));
                link
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(run_once(), run_once());
}

// ============================================================================
// Invalid input
// ============================================================================

#[test]
fn test_out_of_order_flow_event_rejected_on_any_link() {
    let mut manager = MultipathManager::new(config(StrategyKind::RoundRobin)).unwrap();
    manager
        .try_record(&PacketEvent::delivered(LinkId(0), FlowId(2), ms(50), 100, 5.0))
        .unwrap();
    let before = manager.link_snapshot();

    let err = manager
        .try_record(&PacketEvent::delivered(LinkId(1), FlowId(2), ms(10), 100, 5.0))
        .unwrap_err();
    assert!(matches!(err, Error::OutOfOrder { .. }));
    assert!(err.is_runtime());
    assert_eq!(manager.link_snapshot(), before);
    assert_eq!(manager.sla_monitor().flow(FlowId(2)).unwrap().total_packets, 1);
}

#[test]
fn test_invalid_events_do_not_stop_the_run() {
    let mut manager = MultipathManager::new(config(StrategyKind::RoundRobin)).unwrap();
    assert_eq!(
        manager.record(&PacketEvent::delivered(LinkId(9), FlowId(0), ms(0), 100, 1.0)),
        None
    );
    assert_eq!(
        manager.record(&PacketEvent::delivered(LinkId(0), FlowId(0), ms(0), 100, 50_000.0)),
        None
    );
    run(&mut manager, 8);
    assert_eq!(manager.stats().rejected, 2);
    assert_eq!(manager.stats().accepted, 8);
}

// ============================================================================
// Contracts, duplication and snapshots
// ============================================================================

#[test]
fn test_explicit_contract_for_extra_flow() {
    let mut manager = MultipathManager::new(config(StrategyKind::RoundRobin)).unwrap();
    manager
        .set_flow_contract(FlowId(20), ContractLevel::CriticalHigh)
        .unwrap();
    manager.record(&PacketEvent::delivered(LinkId(0), FlowId(20), ms(0), 100, 2.0));
    assert_eq!(manager.sla_monitor().deviation(FlowId(20)), Some(100.0));
}

#[test]
fn test_duplicated_dispatch_is_recorded() {
    let mut config = config(StrategyKind::RoundRobin);
    config.duplication.enabled = true;
    let mut manager = MultipathManager::new(config).unwrap();

    let mut t = 0;
    for _ in 0..10 {
        let dispatch = manager.dispatch(FlowId(0));
        assert_eq!(dispatch.backups.len(), 2);
        assert!(!dispatch.backups.contains(&dispatch.primary));

        manager.record(&PacketEvent::delivered(dispatch.primary, FlowId(0), ms(t), 200, 0.5));
        for backup in &dispatch.backups {
            manager.record(
                &PacketEvent::delivered(*backup, FlowId(0), ms(t), 200, 0.7).as_duplicate(),
            );
        }
        t += 1;
    }

    let duplicates: u64 = manager
        .link_monitor()
        .links()
        .iter()
        .map(|l| l.duplicates_transmitted)
        .sum();
    assert_eq!(duplicates, 20);
}

#[test]
fn test_restored_snapshot_replays_identically() {
    let events: Vec<PacketEvent> = (0..120)
        .map(|t| transmit(LinkId((t % 3) as u8), FlowId((t % 4) as u8), t))
        .collect();
    let (head, tail) = events.split_at(60);

    let mut original = MultipathManager::new(config(StrategyKind::ReliabilityAware)).unwrap();
    for event in head {
        original.record(event);
    }

    let json = serde_json::to_string(&original.link_snapshot()).unwrap();
    let snapshot: Vec<LinkMetrics> = serde_json::from_str(&json).unwrap();

    let mut restored = MultipathManager::new(config(StrategyKind::ReliabilityAware)).unwrap();
    restored.restore_links(snapshot).unwrap();
    assert_eq!(restored.link_snapshot(), original.link_snapshot());

    for event in tail {
        original.record(event);
        restored.record(event);
    }
    assert_eq!(restored.link_snapshot(), original.link_snapshot());
    assert_eq!(
        restored.link_monitor().average_recovery_time(),
        original.link_monitor().average_recovery_time()
    );
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_config_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mlo-core.toml");

    let mut config = config(StrategyKind::SlaAware);
    config.links.bands = vec![FrequencyBand::Ghz5, FrequencyBand::Ghz6];
    config.monitor.throughput_window = ms(500);
    config.strategy.seed = 1234;
    config.logging.level = LogLevel::Debug;
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.traffic.emergency_tids, 1);
    assert_eq!(loaded.links.bands, config.links.bands);
    assert_eq!(loaded.monitor.throughput_window, ms(500));
    assert_eq!(loaded.strategy.kind, StrategyKind::SlaAware);
    assert_eq!(loaded.strategy.seed, 1234);
    assert_eq!(loaded.logging.level, LogLevel::Debug);
    assert_eq!(loaded.num_links(), 2);
}

#[test]
fn test_config_from_toml() {
    let config = Config::from_toml_str(
        r#"
        [traffic]
        tid_count = 8
        emergency_tids = 2
        critical_tids = 3

        [links]
        bands = ["2.4ghz", "5ghz", "6ghz", "6ghz"]

        [monitor]
        throughput_window = "250ms"

        [strategy]
        kind = "greedy_load"

        [connections]
        normal_reassign_interval = "3s"
        "#,
    )
    .unwrap();

    assert_eq!(config.num_links(), 4);
    assert_eq!(config.monitor.throughput_window, ms(250));
    assert_eq!(config.monitor.outcome_window, 50);
    assert_eq!(config.strategy.kind, StrategyKind::GreedyLoad);
    assert_eq!(config.connections.normal_reassign_interval, Duration::from_secs(3));
    assert_eq!(config.connections.critical_reassign_interval, Duration::from_secs(5));

    let manager = MultipathManager::new(config).unwrap();
    assert_eq!(manager.classify(FlowId(4)).tier, Tier::Critical);
    assert_eq!(manager.classify(FlowId(5)).tier, Tier::Normal);
}

#[test]
fn test_invalid_tier_counts_rejected() {
    let err = Config::from_toml_str(
        r#"
        [traffic]
        tid_count = 4
        emergency_tids = 3
        critical_tids = 2
        "#,
    )
    .unwrap_err();
    assert!(err.is_fatal());

    let err = Config::load("/nonexistent/mlo-core.toml").unwrap_err();
    assert!(err.is_fatal());
}
