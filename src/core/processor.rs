use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::error;

use super::reconnect_after_close;
use super::Dispatcher;
use super::FlowHandle;
use super::QueueItem;
use crate::broker::Broker;
use crate::broker::Message;
use crate::broker::PulledMessage;
use crate::errors::BrokerError;
use crate::metrics::MetricLabels;
use crate::metrics::EVENTS_WAITING;
use crate::metrics::EVENTS_WAITING_TIME;
use crate::metrics::EVENTS_WAITING_TIMEOUTS;

/// The bounded-concurrency dispatch loop of one subscription.
///
/// Drains the local queue, drops messages whose ack deadline already
/// passed, waits for a free handler slot within the remaining deadline,
/// and spawns each dispatch as a tracked task.
pub(crate) struct Processor {
    queue_rx: mpsc::UnboundedReceiver<QueueItem>,
    dispatcher: Arc<Dispatcher>,
    broker: Arc<dyn Broker>,
    flow: Arc<FlowHandle>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    ack_wait: Duration,
    labels: MetricLabels,
}

impl Processor {
    pub(crate) fn new(
        queue_rx: mpsc::UnboundedReceiver<QueueItem>,
        dispatcher: Arc<Dispatcher>,
        broker: Arc<dyn Broker>,
        flow: Arc<FlowHandle>,
        tracker: TaskTracker,
        shutdown: CancellationToken,
        ack_wait: Duration,
        labels: MetricLabels,
    ) -> Self {
        Self {
            queue_rx,
            dispatcher,
            broker,
            flow,
            tracker,
            shutdown,
            ack_wait,
            labels,
        }
    }

    pub(crate) async fn run(&mut self) -> std::result::Result<(), BrokerError> {
        loop {
            let Some(item) = self.queue_rx.recv().await else {
                // Pull loop dropped its sender; nothing more will arrive.
                return Ok(());
            };

            let pulled = match item {
                QueueItem::Shutdown => {
                    // Unblock a pull loop parked on the occupancy gate so
                    // it can observe the cancellation.
                    self.flow.notify_pull();
                    return Ok(());
                }
                QueueItem::Message(pulled) => pulled,
            };
            self.flow.dequeued();

            let values = self.labels.values();
            let waited = pulled.pulled_at.elapsed();
            let remaining = self.ack_wait.saturating_sub(waited);
            if remaining.is_zero() {
                // Already past the redelivery deadline: the broker hands
                // this message out again on its own, dispatching it here
                // would double-process it.
                debug!(waited = ?waited, "Dropping message past its ack deadline");
                EVENTS_WAITING_TIMEOUTS.with_label_values(&values).inc();
                EVENTS_WAITING.with_label_values(&values).dec();
                continue;
            }

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Ok(()),
                acquired = timeout(remaining, self.flow.permits().acquire_owned()) => {
                    match acquired {
                        Ok(Ok(permit)) => {
                            EVENTS_WAITING_TIME
                                .with_label_values(&values)
                                .observe(pulled.pulled_at.elapsed().as_secs_f64());
                            EVENTS_WAITING.with_label_values(&values).dec();
                            self.spawn_dispatch(pulled, permit);
                        }
                        Ok(Err(_)) => return Ok(()),
                        Err(_) => {
                            // Deadline elapsed while waiting for a slot.
                            EVENTS_WAITING_TIMEOUTS.with_label_values(&values).inc();
                            EVENTS_WAITING.with_label_values(&values).dec();
                        }
                    }
                }
            }
        }
    }

    /// Runs the handler invocation as an independent tracked task. The
    /// permit rides along and is released on completion, waking one
    /// waiter; the pull loop is notified when occupancy allows fetching
    /// again.
    fn spawn_dispatch(&self, pulled: PulledMessage, permit: OwnedSemaphorePermit) {
        let dispatcher = self.dispatcher.clone();
        let broker = self.broker.clone();
        let flow = self.flow.clone();
        let shutdown = self.shutdown.clone();
        let message: Box<dyn Message> = pulled.message;

        self.tracker.spawn(async move {
            let result = dispatcher.handle(message).await;
            drop(permit);

            match result {
                Ok(()) => {}
                Err(error) if error.is_connection_closed() => {
                    reconnect_after_close(broker.as_ref(), &shutdown).await;
                }
                Err(error) => error!(%error, "Unhandled processing error"),
            }

            if !shutdown.is_cancelled() && flow.below_occupancy_limit() {
                debug!(
                    queued = flow.queued(),
                    batch = flow.batch(),
                    active = flow.active_tasks(),
                    "Signaling pull task"
                );
                flow.notify_pull();
            }
        });
    }
}
