use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

use super::Subscription;
use crate::broker::Message;
use crate::errors::DispatchError;
use crate::errors::HandlerError;
use crate::metrics::EVENTS_ACK_TIMEOUTS;
use crate::metrics::EVENTS_DELAY;
use crate::metrics::EVENTS_IN_PROGRESS;
use crate::metrics::EVENTS_PROCESSING_TIME;
use crate::metrics::EVENTS_TOTAL;
use crate::metrics::EVENT_NAKS;
use crate::metrics::EXCEPTIONS;
use crate::metrics::MetricLabels;

/// Routes one fetched message: decode against the subscription's model
/// set, invoke the handler, and turn the outcome into an ack or a nak.
pub(crate) struct Dispatcher {
    subscription: Arc<Subscription>,
    labels: MetricLabels,
    ack_wait: Duration,
}

impl Dispatcher {
    pub(crate) fn new(
        subscription: Arc<Subscription>,
        labels: MetricLabels,
        ack_wait: Duration,
    ) -> Self {
        Self {
            subscription,
            labels,
            ack_wait,
        }
    }

    /// Settles `message` and returns only the failures the owning task
    /// must see: broker errors from ack/nak, an exhausted redelivery
    /// window, or a handler failure that is not a redelivery request.
    pub(crate) async fn handle(
        &self,
        message: Box<dyn Message>,
    ) -> std::result::Result<(), DispatchError> {
        let prepared = match self.subscription.prepare(message.payload()) {
            Ok(prepared) => prepared,
            Err(error) => {
                // Ack to avoid retrying messages we cannot handle.
                warn!(
                    subject = message.subject(),
                    %error,
                    "Couldn't decode message"
                );
                if self.subscription.ack_required() {
                    message.ack().await?;
                }
                return Ok(());
            }
        };

        let Some(invoke) = prepared.invoke else {
            debug!(event = %prepared.name, "Ignored event");
            message.ack().await?;
            return Ok(());
        };

        let values = self.labels.values();
        EVENTS_TOTAL.with_label_values(&values).inc();
        EVENTS_DELAY
            .with_label_values(&values)
            .set(prepared.occurred_at.timestamp() as f64);
        EVENTS_IN_PROGRESS.with_label_values(&values).inc();

        let started = Instant::now();
        let outcome = invoke.await;
        let elapsed = started.elapsed();

        EVENTS_IN_PROGRESS.with_label_values(&values).dec();

        match outcome {
            Ok(()) => {
                EVENTS_PROCESSING_TIME
                    .with_label_values(&values)
                    .observe(elapsed.as_secs_f64());
                if elapsed > self.ack_wait {
                    EVENTS_ACK_TIMEOUTS.with_label_values(&values).inc();
                }
                if self.subscription.ack_required() {
                    message.ack().await?;
                }
                Ok(())
            }
            Err(HandlerError::Redeliver {
                delay,
                max_delay,
                source,
            }) => {
                // Age is measured from the event's own timestamp, so the
                // window caps total retrying across redeliveries, not one
                // attempt.
                let age = Utc::now().signed_duration_since(prepared.occurred_at);
                let expired = age.to_std().map(|age| age > max_delay).unwrap_or(false);

                if expired {
                    EXCEPTIONS.with_label_values(&values).inc();
                    Err(DispatchError::RedeliveryExpired {
                        subject: message.subject().to_string(),
                        source,
                    })
                } else {
                    EVENT_NAKS.with_label_values(&values).inc();
                    message.nak(delay).await?;
                    Ok(())
                }
            }
            Err(HandlerError::Other(source)) => {
                EXCEPTIONS.with_label_values(&values).inc();
                Err(DispatchError::Handler {
                    subject: message.subject().to_string(),
                    source,
                })
            }
        }
    }
}
