use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use futures::future::BoxFuture;

use crate::errors::DecodeError;
use crate::errors::HandlerError;
use crate::event::EventSet;
use crate::ConsumerConfig;
use crate::FlowConfig;

type HandlerResult = std::result::Result<(), HandlerError>;

/// Static description of one topic of interest: subject pattern, the
/// accepted event-model set with its handler, durable identity, ack
/// semantics and flow tuning. Immutable once registered.
pub struct Subscription {
    subject: String,
    queue_group: Option<String>,
    max_concurrency: usize,
    ack_required: bool,
    consumer: ConsumerConfig,
    flow: FlowConfig,
    dispatch: Arc<dyn ErasedDispatch>,
}

impl Subscription {
    pub fn builder(subject: impl Into<String>) -> SubscriptionBuilder {
        SubscriptionBuilder::new(subject)
    }

    /// Subject pattern relative to the stream, eg. `order.created.v1`
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Explicit durable consumer name, when not derived
    pub fn queue_group(&self) -> Option<&str> {
        self.queue_group.as_deref()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn ack_required(&self) -> bool {
        self.ack_required
    }

    pub fn consumer(&self) -> &ConsumerConfig {
        &self.consumer
    }

    pub fn flow(&self) -> &FlowConfig {
        &self.flow
    }

    /// Decode `payload` against the registered model set and bind the
    /// handler. Does not run the handler and never touches the broker.
    pub(crate) fn prepare(
        &self,
        payload: &[u8],
    ) -> std::result::Result<PreparedEvent, DecodeError> {
        self.dispatch.prepare(payload)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("subject", &self.subject)
            .field("queue_group", &self.queue_group)
            .field("max_concurrency", &self.max_concurrency)
            .field("ack_required", &self.ack_required)
            .finish()
    }
}

/// Collects subscription options before the handler pins the event set.
///
/// ```rust,no_run
/// use pulley::{EventEnvelope, Subscription};
///
/// let subscription = Subscription::builder("account.changed.v1")
///     .max_concurrency(4)
///     .ignore("account.touched.v1")
///     .handler(|event: EventEnvelope| async move {
///         println!("{}", event.name);
///         Ok(())
///     });
/// ```
pub struct SubscriptionBuilder {
    subject: String,
    queue_group: Option<String>,
    max_concurrency: usize,
    ack_required: bool,
    consumer: ConsumerConfig,
    flow: FlowConfig,
    ignored: HashSet<String>,
}

impl SubscriptionBuilder {
    fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            queue_group: None,
            max_concurrency: 1,
            ack_required: true,
            consumer: ConsumerConfig::default(),
            flow: FlowConfig::default(),
            ignored: HashSet::new(),
        }
    }

    /// Cap on concurrently running handler invocations. At least 1.
    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Explicit durable consumer name instead of the derived
    /// `{consumer}-{stream}-{subject}` one.
    pub fn queue_group(mut self, queue_group: impl Into<String>) -> Self {
        self.queue_group = Some(queue_group.into());
        self
    }

    /// Whether messages are acknowledged after handling. Defaults to
    /// true; disable only for consumers whose broker config does not
    /// require acks.
    pub fn ack_required(mut self, ack_required: bool) -> Self {
        self.ack_required = ack_required;
        self
    }

    pub fn consumer_config(mut self, consumer: ConsumerConfig) -> Self {
        self.consumer = consumer;
        self
    }

    pub fn flow_config(mut self, flow: FlowConfig) -> Self {
        self.flow = flow;
        self
    }

    /// Event name to acknowledge silently without invoking the handler.
    /// May be called repeatedly.
    pub fn ignore(mut self, event_name: impl Into<String>) -> Self {
        self.ignored.insert(event_name.into());
        self
    }

    /// Finalize with the handler, pinning the accepted event set `E`.
    pub fn handler<E, F, Fut>(self, handler: F) -> Subscription
    where
        E: EventSet,
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let dispatch = TypedDispatch {
            handler: Arc::new(move |event: E| -> BoxFuture<'static, HandlerResult> {
                Box::pin(handler(event))
            }),
            ignored: self.ignored,
        };

        Subscription {
            subject: self.subject,
            queue_group: self.queue_group,
            max_concurrency: self.max_concurrency,
            ack_required: self.ack_required,
            consumer: self.consumer,
            flow: self.flow,
            dispatch: Arc::new(dispatch),
        }
    }
}

/// A decoded event with its handler invocation bound but not yet run.
pub(crate) struct PreparedEvent {
    pub(crate) name: String,
    pub(crate) occurred_at: DateTime<Utc>,
    /// None when the decoded variant is in the ignore set
    pub(crate) invoke: Option<BoxFuture<'static, HandlerResult>>,
}

/// Erases the event-set type parameter so one dispatcher can serve any
/// subscription.
trait ErasedDispatch: Send + Sync {
    fn prepare(&self, payload: &[u8]) -> std::result::Result<PreparedEvent, DecodeError>;
}

struct TypedDispatch<E: EventSet> {
    handler: Arc<dyn Fn(E) -> BoxFuture<'static, HandlerResult> + Send + Sync>,
    ignored: HashSet<String>,
}

impl<E: EventSet> ErasedDispatch for TypedDispatch<E> {
    fn prepare(&self, payload: &[u8]) -> std::result::Result<PreparedEvent, DecodeError> {
        let event: E = serde_json::from_slice(payload)?;
        let name = event.event_name().to_string();
        let occurred_at = event.occurred_at();

        let invoke = if self.ignored.contains(&name) {
            None
        } else {
            Some((self.handler)(event))
        };

        Ok(PreparedEvent {
            name,
            occurred_at,
            invoke,
        })
    }
}
