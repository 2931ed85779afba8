use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::Subscription;
use crate::errors::HandlerError;
use crate::test_utils::{order_cancelled, order_created, OrderEvents};

#[tokio::test]
async fn test_prepare_decodes_and_binds_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let handler_calls = calls.clone();
    let subscription =
        Subscription::builder("order.created.v1").handler(move |event: OrderEvents| {
            let calls = handler_calls.clone();
            async move {
                assert_eq!(event.order_id(), 7);
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

    let prepared = subscription.prepare(&order_created(7)).unwrap();
    assert_eq!(prepared.name, "order.created.v1");

    prepared.invoke.expect("handler bound").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_ignored_event_is_not_bound() {
    let subscription = Subscription::builder("order.*")
        .ignore("order.cancelled.v1")
        .handler(|_event: OrderEvents| async { Ok(()) });

    let prepared = subscription.prepare(&order_cancelled(1)).unwrap();
    assert_eq!(prepared.name, "order.cancelled.v1");
    assert!(prepared.invoke.is_none());
}

#[test]
fn test_prepare_rejects_malformed_payloads() {
    let subscription =
        Subscription::builder("order.created.v1").handler(|_event: OrderEvents| async { Ok(()) });

    assert!(subscription.prepare(b"not json").is_err());
    assert!(subscription
        .prepare(br#"{"name": "unknown.event.v9"}"#)
        .is_err());
}

#[test]
fn test_builder_defaults() {
    let subscription = Subscription::builder("order.created.v1")
        .max_concurrency(0)
        .handler(|_event: OrderEvents| async { Ok(()) });

    // Zero concurrency would deadlock the dispatch loop.
    assert_eq!(subscription.max_concurrency(), 1);
    assert!(subscription.ack_required());
    assert!(subscription.queue_group().is_none());
    assert_eq!(subscription.subject(), "order.created.v1");
}

#[tokio::test]
async fn test_redelivery_request_defaults() {
    let subscription = Subscription::builder("order.created.v1")
        .handler(|_event: OrderEvents| async { Err(HandlerError::redeliver()) });

    let prepared = subscription.prepare(&order_created(1)).unwrap();
    let error = prepared.invoke.unwrap().await.unwrap_err();
    match error {
        HandlerError::Redeliver {
            delay,
            max_delay,
            source,
        } => {
            assert_eq!(delay, Duration::from_secs(30));
            assert_eq!(max_delay, Duration::from_secs(300));
            assert!(source.is_none());
        }
        other => panic!("unexpected handler error: {other:?}"),
    }
}
