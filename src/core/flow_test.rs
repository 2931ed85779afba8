use std::time::Duration;

use super::FlowHandle;
use crate::FlowConfig;

fn pinned_flow(min_batch: usize, max_batch: usize) -> FlowConfig {
    FlowConfig {
        min_batch,
        max_batch: Some(max_batch),
        ..FlowConfig::default()
    }
}

#[test]
fn test_batch_starts_at_resolved_max() {
    let flow = FlowHandle::new(&FlowConfig::default(), 1000, 1);
    assert_eq!(flow.batch(), 100);

    let flow = FlowHandle::new(&pinned_flow(10, 30), 1000, 1);
    assert_eq!(flow.batch(), 30);
}

#[test]
fn test_batch_shrinks_once_history_fills_without_saturation() {
    let flow = FlowHandle::new(&pinned_flow(10, 30), 1000, 1);

    for _ in 0..9 {
        flow.record_fetch(1);
    }
    // Window not full yet.
    assert_eq!(flow.batch(), 30);

    flow.record_fetch(1);
    assert_eq!(flow.batch(), 20);

    // The window keeps rolling, so every further lean fetch shrinks.
    flow.record_fetch(1);
    assert_eq!(flow.batch(), 10);

    flow.record_fetch(1);
    assert_eq!(flow.batch(), 10); // floored at min_batch
}

#[test]
fn test_batch_grows_on_sustained_saturation() {
    let flow = FlowHandle::new(&pinned_flow(10, 30), 1000, 1);

    // Drive the batch down to min first.
    for _ in 0..11 {
        flow.record_fetch(1);
    }
    assert_eq!(flow.batch(), 10);

    // Saturated fetches displace the lean samples until the window mean
    // crosses the threshold.
    for _ in 0..9 {
        flow.record_fetch(10);
    }
    assert_eq!(flow.batch(), 20);

    // History was reset on growth; one full fetch saturates it again.
    flow.record_fetch(20);
    assert_eq!(flow.batch(), 30);

    flow.record_fetch(30);
    assert_eq!(flow.batch(), 30); // capped at max_batch
}

#[test]
fn test_fetch_timeout_grows_on_empty_fetches() {
    let flow = FlowHandle::new(&FlowConfig::default(), 1000, 1);
    assert_eq!(flow.fetch_timeout(), Duration::from_millis(100));

    flow.record_empty_fetch();
    assert_eq!(flow.fetch_timeout(), Duration::from_millis(1000));

    flow.record_empty_fetch();
    assert_eq!(flow.fetch_timeout(), Duration::from_millis(1000)); // capped
}

#[test]
fn test_fetch_timeout_shrinks_while_queue_stays_empty() {
    let flow = FlowHandle::new(&FlowConfig::default(), 1000, 1);
    flow.record_empty_fetch();
    assert_eq!(flow.fetch_timeout(), Duration::from_millis(1000));

    flow.record_fetch(5);
    assert_eq!(flow.fetch_timeout(), Duration::from_millis(100));

    flow.record_fetch(5);
    assert_eq!(flow.fetch_timeout(), Duration::from_millis(10));

    flow.record_fetch(5);
    assert_eq!(flow.fetch_timeout(), Duration::from_millis(10)); // floored
}

#[test]
fn test_fetch_timeout_unchanged_while_queue_occupied() {
    let flow = FlowHandle::new(&FlowConfig::default(), 1000, 1);
    flow.enqueued();
    flow.record_fetch(5);
    assert_eq!(flow.fetch_timeout(), Duration::from_millis(100));
}

#[test]
fn test_occupancy_gate_thresholds() {
    // Batch pinned at 10 with the default 0.2 ratio: limit is 2.
    let flow = FlowHandle::new(&pinned_flow(10, 10), 1000, 1);

    assert!(!flow.should_pause());
    flow.enqueued();
    assert!(!flow.should_pause());
    flow.enqueued();
    assert!(flow.should_pause());
    assert!(!flow.below_occupancy_limit());

    flow.dequeued();
    assert!(!flow.should_pause());
    assert!(flow.below_occupancy_limit());
    assert_eq!(flow.queued(), 1);
}

#[tokio::test]
async fn test_active_tasks_stay_within_bounds() {
    let flow = FlowHandle::new(&FlowConfig::default(), 1000, 2);
    assert_eq!(flow.max_concurrency(), 2);
    assert_eq!(flow.active_tasks(), 0);

    let first = flow.permits().try_acquire_owned().unwrap();
    let second = flow.permits().try_acquire_owned().unwrap();
    assert_eq!(flow.active_tasks(), 2);

    // The cap is hard; a third slot simply does not exist.
    assert!(flow.permits().try_acquire_owned().is_err());

    drop(first);
    assert_eq!(flow.active_tasks(), 1);
    drop(second);
    assert_eq!(flow.active_tasks(), 0);
}
