use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::Dispatcher;
use super::FlowHandle;
use super::Processor;
use super::Puller;
use super::QueueItem;
use super::Subscription;
use crate::broker::Broker;
use crate::broker::PullConsumer;
use crate::errors::BrokerError;
use crate::metrics::initialize_subscription_metrics;
use crate::metrics::MetricLabels;
use crate::utils::durable_name;
use crate::ConsumerConfig;
use crate::Error;
use crate::Result;
use crate::StreamSettings;

/// One subscription's pull pipeline: the durable consumer handle, the
/// local queue bridging the pull and process loops, and the lifecycle
/// primitives shared between them.
pub(crate) struct PullSubscriber {
    subscription: Arc<Subscription>,
    connected: Option<ConnectedState>,
}

struct ConnectedState {
    broker: Arc<dyn Broker>,
    consumer: Arc<dyn PullConsumer>,
    /// Broker-side consumer config read back after subscribing; its
    /// ack_wait governs the local deadline math
    effective: ConsumerConfig,
    flow: Arc<FlowHandle>,
    queue_tx: mpsc::UnboundedSender<QueueItem>,
    queue_rx: Option<mpsc::UnboundedReceiver<QueueItem>>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    labels: MetricLabels,
    full_subject: String,
    shutdown_grace: Duration,
}

impl PullSubscriber {
    pub(crate) fn new(subscription: Subscription) -> Self {
        Self {
            subscription: Arc::new(subscription),
            connected: None,
        }
    }

    pub(crate) async fn connect(
        &mut self,
        stream_name: &str,
        consumer_name: &str,
        broker: Arc<dyn Broker>,
        settings: &StreamSettings,
    ) -> Result<()> {
        let durable = self
            .subscription
            .queue_group()
            .map(str::to_string)
            .unwrap_or_else(|| {
                durable_name(consumer_name, stream_name, self.subscription.subject())
            });

        // The full subject includes the stream namespace, eg.
        // "SIP.account.changed.v1".
        let full_subject = format!("{}.{}", stream_name, self.subscription.subject());
        let labels = MetricLabels::from_subject(&full_subject);
        initialize_subscription_metrics(&labels);

        info!("Stream listening on {}", full_subject);
        info!("Using queue: {}", durable);

        let consumer: Arc<dyn PullConsumer> = Arc::from(
            broker
                .pull_subscribe(
                    stream_name,
                    &full_subject,
                    &durable,
                    self.subscription.consumer(),
                )
                .await?,
        );
        let effective = consumer.config().clone();

        let flow = FlowHandle::new(
            self.subscription.flow(),
            effective.max_ack_pending,
            self.subscription.max_concurrency(),
        );
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        self.connected = Some(ConnectedState {
            broker,
            consumer,
            effective,
            flow,
            queue_tx,
            queue_rx: Some(queue_rx),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            labels,
            full_subject,
            shutdown_grace: settings.shutdown_grace(),
        });
        Ok(())
    }

    /// Launch the pull and process loops as independent tracked tasks.
    pub(crate) fn start(&mut self) -> Result<()> {
        let state = self
            .connected
            .as_mut()
            .ok_or_else(|| Error::Fatal("subscription started before connect".to_string()))?;
        let queue_rx = state
            .queue_rx
            .take()
            .ok_or_else(|| Error::Fatal("subscription started twice".to_string()))?;

        let ack_wait = state.effective.ack_wait();

        let puller = Puller::new(
            state.consumer.clone(),
            state.flow.clone(),
            state.queue_tx.clone(),
            state.shutdown.clone(),
            state.labels.clone(),
            state.full_subject.clone(),
        );
        state.tracker.spawn(run_with_reconnect(
            "pull",
            state.broker.clone(),
            state.shutdown.clone(),
            async move { puller.run().await },
        ));

        let dispatcher = Arc::new(Dispatcher::new(
            self.subscription.clone(),
            state.labels.clone(),
            ack_wait,
        ));
        let mut processor = Processor::new(
            queue_rx,
            dispatcher,
            state.broker.clone(),
            state.flow.clone(),
            state.tracker.clone(),
            state.shutdown.clone(),
            ack_wait,
            state.labels.clone(),
        );
        state.tracker.spawn(run_with_reconnect(
            "process",
            state.broker.clone(),
            state.shutdown.clone(),
            async move { processor.run().await },
        ));

        Ok(())
    }

    /// Signal both loops to stop and wait for in-flight work, bounded by
    /// the shutdown grace. Must never hang the process shutdown path.
    pub(crate) async fn disconnect(&mut self) {
        let Some(state) = &self.connected else {
            return;
        };

        state.shutdown.cancel();
        // Signal the queue to break out of a blocking recv in case it
        // was empty.
        let _ = state.queue_tx.send(QueueItem::Shutdown);
        state.flow.notify_pull();

        state.tracker.close();
        if timeout(state.shutdown_grace, state.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                subject = %state.full_subject,
                "In-flight work did not drain before the shutdown grace, abandoning it"
            );
        }
    }
}

/// Wrapper around a consumer loop to trigger an explicit reconnect when
/// the connection gets in a closed state.
pub(crate) async fn run_with_reconnect<F>(
    task_name: &'static str,
    broker: Arc<dyn Broker>,
    shutdown: CancellationToken,
    task: F,
) where
    F: Future<Output = std::result::Result<(), BrokerError>>,
{
    match task.await {
        Ok(()) => {}
        Err(error) if error.is_connection_closed() => {
            reconnect_after_close(broker.as_ref(), &shutdown).await;
        }
        Err(error) => {
            error!(task = task_name, %error, "Consumer task stopped with an error");
        }
    }
}

/// This can happen when the connection received unexpected responses
/// after a reconnect already happened automatically; with the connection
/// in a closed state every call on it keeps failing until an explicit
/// reconnect.
pub(crate) async fn reconnect_after_close(broker: &dyn Broker, shutdown: &CancellationToken) {
    if shutdown.is_cancelled() {
        return;
    }
    if let Err(error) = broker.reconnect().await {
        error!(%error, "Reconnect after a closed connection failed");
    }
}
