//! Broker abstraction layer for durable pull consumption.
//!
//! The broker protocol itself (framing, auth, TLS) lives in an external
//! client library; this module only pins down the seams the consumer
//! pipeline needs: stream describe/create, durable pull subscriptions,
//! batch fetch with a timeout, and per-message ack/nak. Implementations
//! must keep [`BrokerError::FetchTimeout`] and
//! [`BrokerError::ConnectionClosed`] distinguishable from other failures.

// Trait definition of the current module
// -----------------------------------------------------------------------------
// Core seam: broker connection and pull consumers
//

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use tokio::time::Instant;

use crate::BrokerError;
use crate::ConsumerConfig;

pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// Description of a stream to create when it does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    pub name: String,
    /// Subject patterns captured by the stream, eg. `ORDERS.>`
    pub subjects: Vec<String>,
    pub num_replicas: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub name: String,
    pub subjects: Vec<String>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Describes an existing stream.
    ///
    /// # Errors
    /// - Returns [`BrokerError::StreamNotFound`] when no stream with this
    ///   name exists; the caller creates it in that case
    async fn stream_info(&self, stream: &str) -> BrokerResult<StreamInfo>;

    /// Creates a stream. Only called after `stream_info` reported
    /// [`BrokerError::StreamNotFound`].
    async fn create_stream(&self, spec: StreamSpec) -> BrokerResult<StreamInfo>;

    /// Creates or looks up the durable pull consumer identified by
    /// `durable` on `stream`, filtered to `subject`.
    ///
    /// The returned handle exposes the effective broker-side
    /// configuration, which may differ from `config` when the durable
    /// consumer already existed.
    async fn pull_subscribe(
        &self,
        stream: &str,
        subject: &str,
        durable: &str,
        config: &ConsumerConfig,
    ) -> BrokerResult<Box<dyn PullConsumer>>;

    /// Publishes `payload` on `subject`.
    async fn publish(&self, subject: &str, payload: Bytes) -> BrokerResult<()>;

    /// Re-establishes the underlying connection after it entered a
    /// closed state. Called by the consumer loops when an operation
    /// failed with [`BrokerError::ConnectionClosed`].
    async fn reconnect(&self) -> BrokerResult<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PullConsumer: Send + Sync + 'static {
    /// Requests up to `batch` messages, waiting at most `timeout`.
    ///
    /// The broker may return fewer than `batch`. An empty wait must
    /// surface as [`BrokerError::FetchTimeout`], not as an empty `Vec`.
    async fn fetch(&self, batch: usize, timeout: Duration) -> BrokerResult<Vec<Box<dyn Message>>>;

    /// Effective broker-side configuration of this durable consumer.
    fn config(&self) -> &ConsumerConfig;
}

/// One delivered message, settled exactly once with `ack` or `nak`.
#[async_trait]
pub trait Message: Send + Sync + 'static {
    /// Full subject the message was published on, eg.
    /// `ORDERS.order.created.v1`
    fn subject(&self) -> &str;

    fn payload(&self) -> &[u8];

    /// Delivery attempt count as reported by the broker, starting at 1
    fn delivered(&self) -> u64;

    /// Positive acknowledgment; the broker stops redelivering.
    async fn ack(&self) -> BrokerResult<()>;

    /// Negative acknowledgment; the broker redelivers after `delay`.
    async fn nak(&self, delay: Duration) -> BrokerResult<()>;
}

/// A fetched message tagged with the instant it left the broker, so the
/// process loop can honor the remaining ack deadline.
pub struct PulledMessage {
    pub(crate) pulled_at: Instant,
    pub(crate) message: Box<dyn Message>,
}

impl PulledMessage {
    pub(crate) fn new(pulled_at: Instant, message: Box<dyn Message>) -> Self {
        Self { pulled_at, message }
    }
}

impl std::fmt::Debug for PulledMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulledMessage")
            .field("pulled_at", &self.pulled_at)
            .field("subject", &self.message.subject())
            .finish()
    }
}
