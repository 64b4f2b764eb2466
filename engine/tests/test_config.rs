//! Configuration Tests
//!
//! JSON loading fills missing options with defaults and rejects values the
//! scheduler cannot run with.

use tier_ladder_engine::config::{AccumulationRate, EngineConfig, ProfilingDetail};
use tier_ladder_engine::models::TierCatalog;
use tier_ladder_engine::{BatchScheduler, EngineError};

#[test]
fn test_defaults() {
    let config = EngineConfig::default();
    assert_eq!(config.base_chance_percent, 1.0);
    assert_eq!(config.accumulation_rate, AccumulationRate::Low);
    assert_eq!(config.base_threshold, 3.0);
    assert_eq!(config.cost_scaling_factor, 0.5);
    assert_eq!(config.batch_size, 10);
    assert_eq!(config.cycle_period_ticks, 10);
    assert!(!config.resource_gated);
    assert!(!config.continue_at_terminal);
    assert!(config.producer_self_attempts);
    assert_eq!(config.pending_scan_limit, 10);
    assert_eq!(config.event_log_capacity, 100_000);
    assert!(!config.profiling.enabled);
    assert_eq!(config.base_chance(), 0.01);
}

#[test]
fn test_empty_json_is_default() {
    let config = EngineConfig::from_json_str("{}").unwrap();
    assert_eq!(config, EngineConfig::default());
}

#[test]
fn test_partial_json_keeps_other_defaults() {
    let config = EngineConfig::from_json_str(
        r#"{
            "base_chance_percent": 2.5,
            "accumulation_rate": "high",
            "resource_gated": true,
            "rng_seed": 99
        }"#,
    )
    .unwrap();

    assert_eq!(config.base_chance_percent, 2.5);
    assert_eq!(config.accumulation_rate, AccumulationRate::High);
    assert!(config.resource_gated);
    assert_eq!(config.rng_seed, 99);
    assert_eq!(config.batch_size, 10);
    assert_eq!(config.base_threshold, 3.0);
}

#[test]
fn test_nested_profiling_section() {
    let config = EngineConfig::from_json_str(
        r#"{ "profiling": { "enabled": true, "detail": "detailed" } }"#,
    )
    .unwrap();
    assert!(config.profiling.enabled);
    assert_eq!(config.profiling.detail, ProfilingDetail::Detailed);
    assert_eq!(config.profiling.report_every_ticks, 3600);
}

#[test]
fn test_out_of_range_values_rejected() {
    let cases = [
        r#"{ "base_chance_percent": 0.0 }"#,
        r#"{ "base_chance_percent": 150.0 }"#,
        r#"{ "base_threshold": 0.0 }"#,
        r#"{ "cost_scaling_factor": -0.1 }"#,
        r#"{ "batch_size": 0 }"#,
        r#"{ "cycle_period_ticks": 0 }"#,
        r#"{ "pending_scan_limit": 0 }"#,
    ];
    for case in cases {
        let err = EngineConfig::from_json_str(case).unwrap_err();
        assert!(
            matches!(err, EngineError::InvalidConfig(_)),
            "{} gave {:?}",
            case,
            err
        );
    }
}

#[test]
fn test_unknown_rate_is_parse_error() {
    let err = EngineConfig::from_json_str(r#"{ "accumulation_rate": "extreme" }"#).unwrap_err();
    match err {
        EngineError::InvalidConfig(message) => assert!(message.starts_with("parse error")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_full_chance_is_allowed() {
    let config = EngineConfig::from_json_str(r#"{ "base_chance_percent": 100.0 }"#).unwrap();
    assert_eq!(config.base_chance(), 1.0);
}

#[test]
fn test_scheduler_rejects_invalid_config() {
    let config = EngineConfig {
        batch_size: 0,
        ..Default::default()
    };
    let result = BatchScheduler::new(config, TierCatalog::linear(&["normal", "rare"]));
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}

#[test]
fn test_catalog_loads_from_json() {
    let catalog: TierCatalog = serde_json::from_str(
        r#"{ "tiers": [
            { "name": "rare" },
            { "name": "normal", "next": "uncommon" },
            { "name": "uncommon", "next": "rare", "continue_probability": 0.3 }
        ] }"#,
    )
    .unwrap();
    let scheduler = BatchScheduler::new(EngineConfig::default(), catalog).unwrap();
    assert_eq!(scheduler.chain().name_of(0), "normal");
    assert_eq!(scheduler.chain().terminal(), 2);
    assert!(scheduler.chain().is_weighted());
}
