use std::time::Duration;

use crate::FlowConfig;

#[test]
fn test_defaults() {
    let config = FlowConfig::default();
    assert_eq!(config.min_batch, 10);
    assert_eq!(config.max_batch, None);
    assert_eq!(config.batch_step, 10);
    assert_eq!(config.min_fetch_timeout(), Duration::from_millis(10));
    assert_eq!(config.max_fetch_timeout(), Duration::from_millis(1000));
    assert_eq!(config.initial_fetch_timeout(), Duration::from_millis(100));
    assert_eq!(config.occupancy_ratio, 0.2);
    assert!(config.validate().is_ok());
}

#[test]
fn test_max_batch_derived_from_max_ack_pending() {
    let config = FlowConfig::default();
    assert_eq!(config.resolved_max_batch(1000), 100);
    // Small consumers never drop under min_batch.
    assert_eq!(config.resolved_max_batch(50), 10);
}

#[test]
fn test_explicit_max_batch_wins() {
    let config = FlowConfig {
        max_batch: Some(40),
        ..FlowConfig::default()
    };
    assert_eq!(config.resolved_max_batch(1000), 40);
}

#[test]
fn test_validation_rejects_bad_bounds() {
    let zero_min = FlowConfig {
        min_batch: 0,
        ..FlowConfig::default()
    };
    assert!(zero_min.validate().is_err());

    let zero_step = FlowConfig {
        batch_step: 0,
        ..FlowConfig::default()
    };
    assert!(zero_step.validate().is_err());

    let inverted_batch = FlowConfig {
        min_batch: 20,
        max_batch: Some(10),
        ..FlowConfig::default()
    };
    assert!(inverted_batch.validate().is_err());

    let inverted_timeouts = FlowConfig {
        min_fetch_timeout_in_ms: 500,
        max_fetch_timeout_in_ms: 100,
        ..FlowConfig::default()
    };
    assert!(inverted_timeouts.validate().is_err());

    let initial_out_of_range = FlowConfig {
        initial_fetch_timeout_in_ms: 5000,
        ..FlowConfig::default()
    };
    assert!(initial_out_of_range.validate().is_err());

    let bad_ratio = FlowConfig {
        occupancy_ratio: 0.0,
        ..FlowConfig::default()
    };
    assert!(bad_ratio.validate().is_err());

    let ratio_above_one = FlowConfig {
        occupancy_ratio: 1.5,
        ..FlowConfig::default()
    };
    assert!(ratio_above_one.validate().is_err());
}
