use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::timeout_at;
use tokio::time::Instant;

use crate::broker::Broker;
use crate::broker::BrokerResult;
use crate::broker::Message;
use crate::broker::PullConsumer;
use crate::broker::StreamInfo;
use crate::broker::StreamSpec;
use crate::errors::BrokerError;
use crate::ConsumerConfig;

/// What happened to a delivered message, in settlement order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AckRecord {
    Ack { seq: u64 },
    Nak { seq: u64, delay: Duration },
}

/// One subject's backlog plus a journal of every settlement.
pub(crate) struct MemoryTopic {
    subject: String,
    pending: Mutex<VecDeque<(u64, Bytes)>>,
    journal: Mutex<Vec<AckRecord>>,
    notify: Notify,
    next_seq: AtomicU64,
    fetch_calls: AtomicUsize,
    delivered_batches: AtomicUsize,
    closed: Arc<AtomicBool>,
}

impl MemoryTopic {
    fn new(subject: String, closed: Arc<AtomicBool>) -> Self {
        Self {
            subject,
            pending: Mutex::new(VecDeque::new()),
            journal: Mutex::new(Vec::new()),
            notify: Notify::new(),
            next_seq: AtomicU64::new(1),
            fetch_calls: AtomicUsize::new(0),
            delivered_batches: AtomicUsize::new(0),
            closed,
        }
    }

    /// Append a message to the backlog and wake any waiting fetch.
    pub(crate) fn push(&self, payload: Bytes) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().push_back((seq, payload));
        self.notify.notify_waiters();
        seq
    }

    pub(crate) fn journal(&self) -> Vec<AckRecord> {
        self.journal.lock().clone()
    }

    pub(crate) fn acked(&self) -> Vec<u64> {
        self.journal
            .lock()
            .iter()
            .filter_map(|record| match record {
                AckRecord::Ack { seq } => Some(*seq),
                AckRecord::Nak { .. } => None,
            })
            .collect()
    }

    pub(crate) fn naks(&self) -> Vec<(u64, Duration)> {
        self.journal
            .lock()
            .iter()
            .filter_map(|record| match record {
                AckRecord::Nak { seq, delay } => Some((*seq, *delay)),
                AckRecord::Ack { .. } => None,
            })
            .collect()
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Total fetch attempts, including ones that timed out empty.
    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Fetches that actually handed out messages.
    pub(crate) fn delivered_batches(&self) -> usize {
        self.delivered_batches.load(Ordering::SeqCst)
    }
}

struct MemoryConsumer {
    topic: Arc<MemoryTopic>,
    config: ConsumerConfig,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl PullConsumer for MemoryConsumer {
    async fn fetch(&self, batch: usize, timeout: Duration) -> BrokerResult<Vec<Box<dyn Message>>> {
        self.topic.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let deadline = Instant::now() + timeout;

        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(BrokerError::ConnectionClosed);
            }

            // Register for wakeups before checking the backlog so a push
            // racing this check is not missed.
            let notified = self.topic.notify.notified();

            let drained: Vec<(u64, Bytes)> = {
                let mut pending = self.topic.pending.lock();
                let take = batch.min(pending.len());
                pending.drain(..take).collect()
            };

            if !drained.is_empty() {
                self.topic.delivered_batches.fetch_add(1, Ordering::SeqCst);
                return Ok(drained
                    .into_iter()
                    .map(|(seq, payload)| {
                        Box::new(MemoryMessage {
                            subject: self.topic.subject.clone(),
                            payload,
                            seq,
                            topic: self.topic.clone(),
                            closed: self.closed.clone(),
                        }) as Box<dyn Message>
                    })
                    .collect());
            }

            if timeout_at(deadline, notified).await.is_err() {
                return Err(BrokerError::FetchTimeout(timeout));
            }
        }
    }

    fn config(&self) -> &ConsumerConfig {
        &self.config
    }
}

struct MemoryMessage {
    subject: String,
    payload: Bytes,
    seq: u64,
    topic: Arc<MemoryTopic>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Message for MemoryMessage {
    fn subject(&self) -> &str {
        &self.subject
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn delivered(&self) -> u64 {
        1
    }

    async fn ack(&self) -> BrokerResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::ConnectionClosed);
        }
        self.topic.journal.lock().push(AckRecord::Ack { seq: self.seq });
        Ok(())
    }

    async fn nak(&self, delay: Duration) -> BrokerResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::ConnectionClosed);
        }
        self.topic
            .journal
            .lock()
            .push(AckRecord::Nak { seq: self.seq, delay });
        Ok(())
    }
}

/// In-memory rendition of the broker seam: streams are names, topics are
/// keyed by full subject, fetches block on a Notify until pushed to.
pub(crate) struct MemoryBroker {
    streams: Mutex<HashMap<String, StreamInfo>>,
    topics: Mutex<HashMap<String, Arc<MemoryTopic>>>,
    published: Mutex<Vec<(String, Bytes)>>,
    created: Mutex<Vec<StreamSpec>>,
    durables: Mutex<Vec<String>>,
    closed: Arc<AtomicBool>,
    reconnects: AtomicUsize,
}

impl MemoryBroker {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            streams: Mutex::new(HashMap::new()),
            topics: Mutex::new(HashMap::new()),
            published: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            durables: Mutex::new(Vec::new()),
            closed: Arc::new(AtomicBool::new(false)),
            reconnects: AtomicUsize::new(0),
        })
    }

    /// A broker on which `stream_name` already exists.
    pub(crate) fn with_stream(stream_name: &str) -> Arc<Self> {
        let broker = Self::new();
        broker.streams.lock().insert(
            stream_name.to_string(),
            StreamInfo {
                name: stream_name.to_string(),
                subjects: vec![format!("{stream_name}.>")],
            },
        );
        broker
    }

    /// Get or create the topic behind a full subject.
    pub(crate) fn topic(&self, subject: &str) -> Arc<MemoryTopic> {
        self.topics
            .lock()
            .entry(subject.to_string())
            .or_insert_with(|| {
                Arc::new(MemoryTopic::new(subject.to_string(), self.closed.clone()))
            })
            .clone()
    }

    /// Drop the connection into a closed state: every fetch/ack/nak
    /// fails with `ConnectionClosed` until `reconnect`.
    pub(crate) fn close_connection(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for topic in self.topics.lock().values() {
            topic.notify.notify_waiters();
        }
    }

    pub(crate) fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    pub(crate) fn has_stream(&self, stream_name: &str) -> bool {
        self.streams.lock().contains_key(stream_name)
    }

    pub(crate) fn created_streams(&self) -> Vec<StreamSpec> {
        self.created.lock().clone()
    }

    pub(crate) fn published(&self) -> Vec<(String, Bytes)> {
        self.published.lock().clone()
    }

    /// Durable consumer names seen by `pull_subscribe`, in call order.
    pub(crate) fn durables(&self) -> Vec<String> {
        self.durables.lock().clone()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn stream_info(&self, stream: &str) -> BrokerResult<StreamInfo> {
        self.streams
            .lock()
            .get(stream)
            .cloned()
            .ok_or_else(|| BrokerError::StreamNotFound(stream.to_string()))
    }

    async fn create_stream(&self, spec: StreamSpec) -> BrokerResult<StreamInfo> {
        let info = StreamInfo {
            name: spec.name.clone(),
            subjects: spec.subjects.clone(),
        };
        self.streams.lock().insert(spec.name.clone(), info.clone());
        self.created.lock().push(spec);
        Ok(info)
    }

    async fn pull_subscribe(
        &self,
        _stream: &str,
        subject: &str,
        durable: &str,
        config: &ConsumerConfig,
    ) -> BrokerResult<Box<dyn PullConsumer>> {
        self.durables.lock().push(durable.to_string());
        Ok(Box::new(MemoryConsumer {
            topic: self.topic(subject),
            config: config.clone(),
            closed: self.closed.clone(),
        }))
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> BrokerResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::ConnectionClosed);
        }
        self.published
            .lock()
            .push((subject.to_string(), payload.clone()));
        self.topic(subject).push(payload);
        Ok(())
    }

    async fn reconnect(&self) -> BrokerResult<()> {
        self.closed.store(false, Ordering::SeqCst);
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Standalone message fake for dispatcher tests, journaling its own
/// settlements.
pub(crate) struct RecordingMessage {
    subject: String,
    payload: Bytes,
    pub(crate) acks: Arc<AtomicUsize>,
    pub(crate) naks: Arc<Mutex<Vec<Duration>>>,
    closed: bool,
}

impl RecordingMessage {
    pub(crate) fn new(subject: &str, payload: Bytes) -> Self {
        Self {
            subject: subject.to_string(),
            payload,
            acks: Arc::new(AtomicUsize::new(0)),
            naks: Arc::new(Mutex::new(Vec::new())),
            closed: false,
        }
    }

    /// A message whose ack/nak fail with `ConnectionClosed`.
    pub(crate) fn closed(subject: &str, payload: Bytes) -> Self {
        Self {
            closed: true,
            ..Self::new(subject, payload)
        }
    }
}

#[async_trait]
impl Message for RecordingMessage {
    fn subject(&self) -> &str {
        &self.subject
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn delivered(&self) -> u64 {
        1
    }

    async fn ack(&self) -> BrokerResult<()> {
        if self.closed {
            return Err(BrokerError::ConnectionClosed);
        }
        self.acks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn nak(&self, delay: Duration) -> BrokerResult<()> {
        if self.closed {
            return Err(BrokerError::ConnectionClosed);
        }
        self.naks.lock().push(delay);
        Ok(())
    }
}
