use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::sync::Semaphore;

use crate::constants::FETCH_HISTORY_LEN;
use crate::constants::SATURATION_RATIO;
use crate::constants::TIMEOUT_ADAPT_FACTOR;
use crate::FlowConfig;

/// Mutable fetch-tuning state shared by the pull and process loops.
///
/// Only ever touched through [`FlowHandle`], which serializes access
/// behind one lock. Nothing here survives a disconnect; the durable
/// cursor lives broker-side.
#[derive(Debug)]
struct FlowState {
    batch: usize,
    fetch_timeout: Duration,
    fetch_history: VecDeque<usize>,
    /// Messages sitting in the local queue, not yet picked up by the
    /// process loop
    queued: usize,

    min_batch: usize,
    max_batch: usize,
    batch_step: usize,
    min_fetch_timeout: Duration,
    max_fetch_timeout: Duration,
    occupancy_ratio: f64,
}

impl FlowState {
    fn new(flow: &FlowConfig, max_ack_pending: usize) -> Self {
        let max_batch = flow.resolved_max_batch(max_ack_pending);
        Self {
            // Batch starts high so any backlog is consumed with as few
            // pulls as possible; sustained light traffic shrinks it to
            // redistribute load across consumers.
            batch: max_batch,
            fetch_timeout: flow.initial_fetch_timeout(),
            fetch_history: VecDeque::with_capacity(FETCH_HISTORY_LEN),
            queued: 0,
            min_batch: flow.min_batch,
            max_batch,
            batch_step: flow.batch_step,
            min_fetch_timeout: flow.min_fetch_timeout(),
            max_fetch_timeout: flow.max_fetch_timeout(),
            occupancy_ratio: flow.occupancy_ratio,
        }
    }

    /// Queue occupancy at which pulling pauses. Never zero, so an empty
    /// queue always admits at least one fetch.
    fn occupancy_limit(&self) -> usize {
        ((self.batch as f64) * self.occupancy_ratio).ceil().max(1.0) as usize
    }

    fn record_empty_fetch(&mut self) {
        self.fetch_timeout = (self.fetch_timeout * TIMEOUT_ADAPT_FACTOR).min(self.max_fetch_timeout);
    }

    fn record_fetch(&mut self, fetched: usize) {
        // A non-empty fetch into an empty local queue means consumers
        // are keeping up; tighten the poll latency.
        if self.queued == 0 && fetched > 0 {
            self.fetch_timeout =
                (self.fetch_timeout / TIMEOUT_ADAPT_FACTOR).max(self.min_fetch_timeout);
        }

        if self.fetch_history.len() == FETCH_HISTORY_LEN {
            self.fetch_history.pop_front();
        }
        self.fetch_history.push_back(fetched);

        let mean =
            self.fetch_history.iter().sum::<usize>() as f64 / self.fetch_history.len() as f64;
        if mean >= self.batch as f64 * SATURATION_RATIO {
            self.batch = (self.batch + self.batch_step).min(self.max_batch);
            self.fetch_history.clear();
        } else if self.fetch_history.len() >= FETCH_HISTORY_LEN {
            self.batch = self.batch.saturating_sub(self.batch_step).max(self.min_batch);
        }
    }
}

/// Shared flow-control surface of one subscription: the adaptive fetch
/// state, the occupancy gate waking the pull loop, and the semaphore
/// capping concurrently running handlers.
pub(crate) struct FlowHandle {
    state: Mutex<FlowState>,
    /// Wakes the pull loop once queue occupancy drops back under its
    /// limit
    pull_gate: Notify,
    /// One permit per concurrently running handler invocation
    permits: Arc<Semaphore>,
    max_concurrency: usize,
}

impl FlowHandle {
    pub(crate) fn new(
        flow: &FlowConfig,
        max_ack_pending: usize,
        max_concurrency: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FlowState::new(flow, max_ack_pending)),
            pull_gate: Notify::new(),
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        })
    }

    pub(crate) fn batch(&self) -> usize {
        self.state.lock().batch
    }

    pub(crate) fn fetch_timeout(&self) -> Duration {
        self.state.lock().fetch_timeout
    }

    /// Current batch size and fetch timeout, read in one locked snapshot.
    pub(crate) fn fetch_params(&self) -> (usize, Duration) {
        let state = self.state.lock();
        (state.batch, state.fetch_timeout)
    }

    pub(crate) fn queued(&self) -> usize {
        self.state.lock().queued
    }

    pub(crate) fn should_pause(&self) -> bool {
        let state = self.state.lock();
        state.queued >= state.occupancy_limit()
    }

    pub(crate) fn below_occupancy_limit(&self) -> bool {
        let state = self.state.lock();
        state.queued < state.occupancy_limit()
    }

    pub(crate) fn record_empty_fetch(&self) {
        self.state.lock().record_empty_fetch();
    }

    /// Feed one fetch result into the batch/timeout controllers. Called
    /// before the fetched messages are enqueued.
    pub(crate) fn record_fetch(&self, fetched: usize) {
        self.state.lock().record_fetch(fetched);
    }

    pub(crate) fn enqueued(&self) {
        self.state.lock().queued += 1;
    }

    pub(crate) fn dequeued(&self) {
        let mut state = self.state.lock();
        state.queued = state.queued.saturating_sub(1);
    }

    pub(crate) async fn pull_gate_open(&self) {
        self.pull_gate.notified().await;
    }

    pub(crate) fn notify_pull(&self) {
        self.pull_gate.notify_one();
    }

    pub(crate) fn permits(&self) -> Arc<Semaphore> {
        self.permits.clone()
    }

    /// Handler invocations currently in flight, in `[0, max_concurrency]`.
    pub(crate) fn active_tasks(&self) -> usize {
        self.max_concurrency - self.permits.available_permits()
    }

    pub(crate) fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}

impl std::fmt::Debug for FlowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FlowHandle")
            .field("batch", &state.batch)
            .field("fetch_timeout", &state.fetch_timeout)
            .field("queued", &state.queued)
            .field("active_tasks", &self.active_tasks())
            .finish()
    }
}
