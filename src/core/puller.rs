use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::yield_now;
use tokio::time::sleep;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;

use super::FlowHandle;
use super::QueueItem;
use crate::broker::PullConsumer;
use crate::broker::PulledMessage;
use crate::constants::EMPTY_FETCH_PAUSE;
use crate::constants::FETCH_ERROR_BACKOFF;
use crate::errors::BrokerError;
use crate::metrics::MetricLabels;
use crate::metrics::EVENTS_WAITING;

/// The adaptive fetch loop of one subscription.
///
/// Pulls batches from the broker, sizes batches and fetch timeouts from
/// recent history, and suspends itself whenever the local queue holds
/// more than its share of the current batch size.
pub(crate) struct Puller {
    consumer: Arc<dyn PullConsumer>,
    flow: Arc<FlowHandle>,
    queue_tx: mpsc::UnboundedSender<QueueItem>,
    shutdown: CancellationToken,
    labels: MetricLabels,
    full_subject: String,
}

impl Puller {
    pub(crate) fn new(
        consumer: Arc<dyn PullConsumer>,
        flow: Arc<FlowHandle>,
        queue_tx: mpsc::UnboundedSender<QueueItem>,
        shutdown: CancellationToken,
        labels: MetricLabels,
        full_subject: String,
    ) -> Self {
        Self {
            consumer,
            flow,
            queue_tx,
            shutdown,
            labels,
            full_subject,
        }
    }

    pub(crate) async fn run(&self) -> std::result::Result<(), BrokerError> {
        let mut last_fetch = Instant::now();

        while !self.shutdown.is_cancelled() {
            // Let the queue be drained some more before pulling any more.
            while self.flow.should_pause() {
                debug!(
                    subject = %self.full_subject,
                    queued = self.flow.queued(),
                    batch = self.flow.batch(),
                    "Too many waiting, not pulling any more messages"
                );
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return Ok(()),
                    _ = self.flow.pull_gate_open() => {}
                }
            }

            let (batch, fetch_timeout) = self.flow.fetch_params();
            match self.consumer.fetch(batch, fetch_timeout).await {
                Ok(messages) => {
                    let now = Instant::now();
                    debug!(
                        fetched = messages.len(),
                        queued = self.flow.queued(),
                        batch,
                        active = self.flow.active_tasks(),
                        timeout = ?fetch_timeout,
                        since_last_fetch = ?now.duration_since(last_fetch),
                        "Fetched messages"
                    );
                    last_fetch = now;

                    self.flow.record_fetch(messages.len());
                    EVENTS_WAITING
                        .with_label_values(&self.labels.values())
                        .add(messages.len() as i64);

                    // Keep track of when these messages were pulled to
                    // have them expire once their ack deadline passes.
                    let pulled_at = Instant::now();
                    let max_concurrency = self.flow.max_concurrency();
                    for (index, message) in messages.into_iter().enumerate() {
                        self.flow.enqueued();
                        if self
                            .queue_tx
                            .send(QueueItem::Message(PulledMessage::new(pulled_at, message)))
                            .is_err()
                        {
                            // Process loop is gone; nothing left to feed.
                            return Ok(());
                        }
                        if (index + 1) % max_concurrency == 0 {
                            yield_now().await;
                        }
                    }
                }
                Err(BrokerError::FetchTimeout(timeout)) => {
                    debug!(subject = %self.full_subject, ?timeout, "No messages available, continuing");
                    sleep(EMPTY_FETCH_PAUSE).await;
                    self.flow.record_empty_fetch();
                }
                Err(BrokerError::ConnectionClosed) => {
                    // Every further fetch on a closed connection fails;
                    // hand over to the reconnect wrapper.
                    return Err(BrokerError::ConnectionClosed);
                }
                Err(error) => {
                    error!(subject = %self.full_subject, %error, "Fetching messages failed");
                    sleep(FETCH_ERROR_BACKOFF).await;
                }
            }
        }

        Ok(())
    }
}
