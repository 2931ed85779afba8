use lazy_static::lazy_static;
use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "stream_events_total",
            "Total count of stream events by subject, eventtype and version"
        ),
        &["subject", "eventtype", "version"]
    )
    .expect("metric can not be created");

    pub static ref EVENTS_PROCESSING_TIME: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "stream_processing_time_seconds",
            "Histogram of stream event processing time by event (in seconds)"
        ),
        &["subject", "eventtype", "version"]
    )
    .expect("metric can not be created");

    pub static ref EVENTS_DELAY: GaugeVec = GaugeVec::new(
        Opts::new(
            "stream_events_delay",
            "Gauge of stream consumer delay by subject, eventtype and version"
        ),
        &["subject", "eventtype", "version"]
    )
    .expect("metric can not be created");

    pub static ref EXCEPTIONS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "stream_exceptions_total",
            "Total count of processing failures by subject, eventtype and version"
        ),
        &["subject", "eventtype", "version"]
    )
    .expect("metric can not be created");

    pub static ref EVENTS_ACK_TIMEOUTS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "stream_ack_timeouts_total",
            "Total count of ack timeouts caused by slow handlers"
        ),
        &["subject", "eventtype", "version"]
    )
    .expect("metric can not be created");

    pub static ref EVENTS_IN_PROGRESS: IntGaugeVec = IntGaugeVec::new(
        Opts::new(
            "stream_events_in_progress",
            "Gauge of stream events currently being processed"
        ),
        &["subject", "eventtype", "version"]
    )
    .expect("metric can not be created");

    pub static ref EVENT_NAKS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "stream_events_nak_total",
            "Total count of stream events negatively acknowledged"
        ),
        &["subject", "eventtype", "version"]
    )
    .expect("metric can not be created");

    pub static ref EVENTS_WAITING_TIME: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "stream_waiting_time_seconds",
            "Histogram of stream event waiting time before being processed (in seconds)"
        )
        .buckets(vec![
            0.001, 0.002, 0.003, 0.004, 0.005, 0.01, 0.02, 0.03, 0.04, 0.05, 0.1, 0.2, 0.3, 0.4,
            0.5, 1.0, 2.0, 3.0, 4.0, 5.0, 10.0, 20.0, 30.0,
        ]),
        &["subject", "eventtype", "version"]
    )
    .expect("metric can not be created");

    pub static ref EVENTS_WAITING_TIMEOUTS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "stream_waiting_timeouts_total",
            "Total count of events dropped because their ack deadline passed before dispatch"
        ),
        &["subject", "eventtype", "version"]
    )
    .expect("metric can not be created");

    pub static ref EVENTS_WAITING: IntGaugeVec = IntGaugeVec::new(
        Opts::new(
            "stream_events_waiting",
            "Gauge of stream events currently waiting before being processed"
        ),
        &["subject", "eventtype", "version"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        register_consumer_metrics(&registry);
        registry
    };
}

fn register_consumer_metrics(registry: &Registry) {
    registry
        .register(Box::new(EVENTS_TOTAL.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(EVENTS_PROCESSING_TIME.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(EVENTS_DELAY.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(EXCEPTIONS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(EVENTS_ACK_TIMEOUTS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(EVENTS_IN_PROGRESS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(EVENT_NAKS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(EVENTS_WAITING_TIME.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(EVENTS_WAITING_TIMEOUTS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(EVENTS_WAITING.clone()))
        .expect("collector can be registered");
}

/// Export consumer metrics in the text exposition format, for the host
/// application to serve from wherever it scrapes.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("could not encode consumer metrics: {}", e);
    };
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("consumer metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}

/// Metric label set of one subscription, split from the full subject:
/// `SIP.account.changed.v1` becomes `("SIP.account", "changed", "v1")`.
#[derive(Debug, Clone)]
pub struct MetricLabels {
    pub subject: String,
    pub eventtype: String,
    pub version: String,
}

impl MetricLabels {
    pub fn from_subject(full_subject: &str) -> Self {
        let parts: Vec<&str> = full_subject.rsplitn(3, '.').collect();
        match parts.as_slice() {
            [version, eventtype, subject] => Self {
                subject: (*subject).to_string(),
                eventtype: (*eventtype).to_string(),
                version: (*version).to_string(),
            },
            // Subjects with fewer than three segments keep everything in
            // the subject label.
            _ => Self {
                subject: full_subject.to_string(),
                eventtype: String::new(),
                version: String::new(),
            },
        }
    }

    pub fn values(&self) -> [&str; 3] {
        [&self.subject, &self.eventtype, &self.version]
    }
}

/// Initialize every series for this label set so scrapes expose them at
/// zero before the first event arrives.
pub(crate) fn initialize_subscription_metrics(labels: &MetricLabels) {
    let values = labels.values();
    EVENTS_TOTAL.with_label_values(&values);
    EVENTS_PROCESSING_TIME.with_label_values(&values);
    EVENTS_DELAY.with_label_values(&values);
    EXCEPTIONS.with_label_values(&values);
    EVENTS_ACK_TIMEOUTS.with_label_values(&values);
    EVENTS_IN_PROGRESS.with_label_values(&values);
    EVENT_NAKS.with_label_values(&values);
    EVENTS_WAITING_TIME.with_label_values(&values);
    EVENTS_WAITING_TIMEOUTS.with_label_values(&values);
    EVENTS_WAITING.with_label_values(&values);
}
