use std::sync::Arc;

use bytes::Bytes;
use futures::future::join_all;
use tracing::info;

use super::PullSubscriber;
use super::Subscription;
use crate::broker::Broker;
use crate::broker::StreamSpec;
use crate::errors::BrokerError;
use crate::Error;
use crate::Result;
use crate::StreamSettings;

/// Owns one logical stream: creates it when absent, and fans lifecycle
/// calls out to every registered subscription's pull pipeline.
///
/// ```rust,no_run
/// use pulley::{EventEnvelope, StreamManager, Subscription};
///
/// # async fn example(broker: std::sync::Arc<dyn pulley::Broker>) -> pulley::Result<()> {
/// let mut manager = StreamManager::new("ORDERS");
/// manager.register(
///     Subscription::builder("order.created.v1")
///         .max_concurrency(4)
///         .handler(|event: EventEnvelope| async move {
///             println!("{}", event.name);
///             Ok(())
///         }),
/// );
///
/// manager.connect(broker, "billing").await?;
/// manager.start().await?;
/// # Ok(())
/// # }
/// ```
pub struct StreamManager {
    stream_name: String,
    settings: StreamSettings,
    broker: Option<Arc<dyn Broker>>,
    subscribers: Vec<PullSubscriber>,
}

impl StreamManager {
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self::with_settings(stream_name, StreamSettings::default())
    }

    pub fn with_settings(stream_name: impl Into<String>, settings: StreamSettings) -> Self {
        Self {
            stream_name: stream_name.into(),
            settings,
            broker: None,
            subscribers: Vec::new(),
        }
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Register a subscription. Collected before [`connect`]; later
    /// registrations are not picked up by an already-connected stream.
    ///
    /// [`connect`]: StreamManager::connect
    pub fn register(&mut self, subscription: Subscription) -> &mut Self {
        self.subscribers.push(PullSubscriber::new(subscription));
        self
    }

    /// Create the stream if it doesn't exist yet, then connect every
    /// registered subscription's durable pull handle.
    pub async fn connect(&mut self, broker: Arc<dyn Broker>, consumer_name: &str) -> Result<()> {
        match broker.stream_info(&self.stream_name).await {
            Ok(_) => {}
            Err(BrokerError::StreamNotFound(_)) => {
                info!("Creating stream {}", self.stream_name);
                broker
                    .create_stream(StreamSpec {
                        name: self.stream_name.clone(),
                        subjects: vec![format!("{}.>", self.stream_name)],
                        num_replicas: self.settings.num_replicas,
                    })
                    .await?;
            }
            Err(error) => return Err(error.into()),
        }

        for subscriber in &mut self.subscribers {
            subscriber
                .connect(&self.stream_name, consumer_name, broker.clone(), &self.settings)
                .await?;
        }

        self.broker = Some(broker);
        Ok(())
    }

    /// Launch every subscription's pull and process loops.
    pub async fn start(&mut self) -> Result<()> {
        for subscriber in &mut self.subscribers {
            subscriber.start()?;
        }
        Ok(())
    }

    /// Stop every subscription and wait for graceful drain, each bounded
    /// by the shutdown grace. Never hangs the process shutdown path.
    pub async fn disconnect(&mut self) {
        join_all(
            self.subscribers
                .iter_mut()
                .map(|subscriber| subscriber.disconnect()),
        )
        .await;
    }

    /// Publish `payload` under the stream's namespace.
    pub async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        let broker = self
            .broker
            .as_ref()
            .ok_or_else(|| Error::Fatal("publish before connect".to_string()))?;
        broker
            .publish(&format!("{}.{}", self.stream_name, subject), payload)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for StreamManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamManager")
            .field("stream_name", &self.stream_name)
            .field("subscriptions", &self.subscribers.len())
            .finish()
    }
}
