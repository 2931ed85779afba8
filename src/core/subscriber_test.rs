use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout, Instant};

use crate::metrics::{EVENTS_WAITING, EVENTS_WAITING_TIMEOUTS};
use crate::test_utils::{order_created, MemoryBroker, OrderEvents};
use crate::{ConsumerConfig, FlowConfig, StreamManager, Subscription};

async fn wait_until(check: impl Fn() -> bool) {
    timeout(Duration::from_secs(30), async {
        while !check() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test(start_paused = true)]
async fn test_bounded_concurrency_end_to_end() {
    let broker = MemoryBroker::with_stream("CONCUR");
    let topic = broker.topic("CONCUR.order.created.v1");
    for order_id in 0..5 {
        topic.push(order_created(order_id));
    }

    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let handled = Arc::new(AtomicUsize::new(0));

    let mut manager = StreamManager::new("CONCUR");
    let (active_h, peak_h, handled_h) = (active.clone(), peak.clone(), handled.clone());
    manager.register(
        Subscription::builder("order.created.v1")
            .max_concurrency(2)
            .handler(move |_event: OrderEvents| {
                let (active, peak, handled) =
                    (active_h.clone(), peak_h.clone(), handled_h.clone());
                async move {
                    let now_active = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now_active, Ordering::SeqCst);
                    sleep(Duration::from_millis(100)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    handled.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
    );

    manager.connect(broker.clone(), "worker").await.unwrap();
    let started_at = Instant::now();
    manager.start().await.unwrap();

    wait_until(|| handled.load(Ordering::SeqCst) == 5).await;
    let elapsed = started_at.elapsed();

    // Exactly two in flight at any instant, three rounds of 100ms total.
    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert!(
        elapsed >= Duration::from_millis(300) && elapsed < Duration::from_millis(400),
        "unexpected wall time: {elapsed:?}"
    );

    manager.disconnect().await;
    assert_eq!(topic.acked().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_acks_follow_fetch_order_when_serial() {
    let broker = MemoryBroker::with_stream("ORDERED");
    let topic = broker.topic("ORDERED.order.created.v1");
    for order_id in 0..5 {
        topic.push(order_created(order_id));
    }

    let mut manager = StreamManager::new("ORDERED");
    manager.register(
        Subscription::builder("order.created.v1")
            .handler(|_event: OrderEvents| async { Ok(()) }),
    );

    manager.connect(broker.clone(), "worker").await.unwrap();
    manager.start().await.unwrap();

    wait_until(|| topic.acked().len() == 5).await;
    assert_eq!(topic.acked(), vec![1, 2, 3, 4, 5]);

    manager.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_expired_messages_are_dropped_not_dispatched() {
    let broker = MemoryBroker::with_stream("DEADLINE");
    let topic = broker.topic("DEADLINE.order.created.v1");
    for order_id in 0..3 {
        topic.push(order_created(order_id));
    }

    let calls = Arc::new(AtomicUsize::new(0));
    let handler_calls = calls.clone();

    let mut manager = StreamManager::new("DEADLINE");
    manager.register(
        Subscription::builder("order.created.v1")
            .consumer_config(ConsumerConfig {
                ack_wait_in_ms: 100,
                max_ack_pending: 1000,
            })
            .handler(move |_event: OrderEvents| {
                let calls = handler_calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    sleep(Duration::from_millis(150)).await;
                    Ok(())
                }
            }),
    );

    manager.connect(broker.clone(), "worker").await.unwrap();
    manager.start().await.unwrap();

    // The first message occupies the single handler slot past the ack
    // deadline of the other two.
    let labels = ["DEADLINE.order", "created", "v1"];
    wait_until(|| EVENTS_WAITING_TIMEOUTS.with_label_values(&labels).get() == 2).await;
    wait_until(|| topic.acked().len() == 1).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(topic.acked(), vec![1]);
    assert_eq!(EVENTS_WAITING.with_label_values(&labels).get(), 0);

    manager.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_backpressure_suspends_fetching() {
    let broker = MemoryBroker::with_stream("PRESSURE");
    let topic = broker.topic("PRESSURE.order.created.v1");
    for order_id in 0..10 {
        topic.push(order_created(order_id));
    }

    // Batch pinned at 10: pulling must pause at 2 queued messages.
    let gate = Arc::new(Semaphore::new(0));
    let handler_gate = gate.clone();

    let mut manager = StreamManager::new("PRESSURE");
    manager.register(
        Subscription::builder("order.created.v1")
            .flow_config(FlowConfig {
                min_batch: 10,
                max_batch: Some(10),
                ..FlowConfig::default()
            })
            .handler(move |_event: OrderEvents| {
                let gate = handler_gate.clone();
                async move {
                    let permit = gate.acquire_owned().await.unwrap();
                    permit.forget();
                    Ok(())
                }
            }),
    );

    manager.connect(broker.clone(), "worker").await.unwrap();
    manager.start().await.unwrap();

    wait_until(|| topic.delivered_batches() == 1).await;

    // Refill the backlog while every handler is blocked; the suspended
    // pull loop must not touch it.
    for order_id in 10..20 {
        topic.push(order_created(order_id));
    }
    sleep(Duration::from_millis(200)).await;
    assert_eq!(topic.delivered_batches(), 1);
    assert_eq!(topic.pending_len(), 10);

    // Capacity frees up, occupancy falls under the limit, pulling resumes.
    gate.add_permits(20);
    wait_until(|| topic.acked().len() == 20).await;
    assert_eq!(topic.delivered_batches(), 2);

    manager.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_closed_connection_triggers_reconnect() {
    let broker = MemoryBroker::with_stream("RECON");

    let mut manager = StreamManager::new("RECON");
    manager.register(
        Subscription::builder("order.created.v1")
            .handler(|_event: OrderEvents| async { Ok(()) }),
    );

    manager.connect(broker.clone(), "worker").await.unwrap();
    manager.start().await.unwrap();

    // Let the pull loop reach its first fetch before dropping the link.
    sleep(Duration::from_millis(10)).await;
    broker.close_connection();

    wait_until(|| broker.reconnects() == 1).await;

    manager.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_bounded_by_shutdown_grace() {
    let broker = MemoryBroker::with_stream("STUCK");
    let topic = broker.topic("STUCK.order.created.v1");
    topic.push(order_created(1));

    let started = Arc::new(AtomicUsize::new(0));
    let handler_started = started.clone();

    let mut manager = StreamManager::new("STUCK");
    manager.register(
        Subscription::builder("order.created.v1").handler(move |_event: OrderEvents| {
            let started = handler_started.clone();
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<()>().await;
                Ok(())
            }
        }),
    );

    manager.connect(broker.clone(), "worker").await.unwrap();
    manager.start().await.unwrap();

    wait_until(|| started.load(Ordering::SeqCst) == 1).await;

    // The handler never finishes; disconnect must still return after the
    // grace period instead of hanging shutdown.
    let disconnect_started = Instant::now();
    manager.disconnect().await;
    let elapsed = disconnect_started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(1000) && elapsed < Duration::from_millis(1500),
        "unexpected disconnect time: {elapsed:?}"
    );
}
