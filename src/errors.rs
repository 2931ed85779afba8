//! Stream Consumer Error Hierarchy
//!
//! Defines error types for the pull-consumer pipeline, categorized by
//! where they originate: the broker connection, event decoding, handler
//! execution, and dispatch bookkeeping.

use std::time::Duration;

use config::ConfigError;

use crate::constants::DEFAULT_REDELIVERY_DELAY;
use crate::constants::DEFAULT_REDELIVERY_WINDOW;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Broker connection and stream management failures
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Configuration validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Event payload decode failures
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Message dispatch failures
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

/// Failures surfaced by the broker seam.
///
/// `FetchTimeout` and `ConnectionClosed` must stay distinguishable: the
/// fetch loop adapts on the former and exits for reconnection on the
/// latter.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// No messages arrived before the fetch deadline
    #[error("Fetch returned no messages within {0:?}")]
    FetchTimeout(Duration),

    /// The underlying connection entered a closed state; every further
    /// operation on it will fail until a reconnect
    #[error("Connection closed")]
    ConnectionClosed,

    /// Stream does not exist on the broker
    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    /// Durable consumer creation or lookup failed
    #[error("Consumer setup failed for {durable}: {reason}")]
    ConsumerSetup { durable: String, reason: String },

    /// Any other broker request failure
    #[error("Broker request failed: {0}")]
    Request(String),
}

impl BrokerError {
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, BrokerError::ConnectionClosed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Payload did not match any registered event variant
    #[error("Malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Failure modes a handler may return.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Ask the broker to redeliver the event after `delay`. Once the
    /// event is older than `max_delay` the request escalates to a hard
    /// failure instead of another redelivery.
    #[error("Redelivery requested in {delay:?}")]
    Redeliver {
        delay: Duration,
        max_delay: Duration,
        #[source]
        source: Option<BoxError>,
    },

    /// Any other failure. The message is not nak'ed; the error surfaces
    /// as an unhandled processing error in the owning task.
    #[error(transparent)]
    Other(#[from] BoxError),
}

impl HandlerError {
    /// Redelivery request with the default delay and window.
    pub fn redeliver() -> Self {
        HandlerError::Redeliver {
            delay: DEFAULT_REDELIVERY_DELAY,
            max_delay: DEFAULT_REDELIVERY_WINDOW,
            source: None,
        }
    }

    /// Redelivery request with an explicit delay and the default window.
    pub fn redeliver_after(delay: Duration) -> Self {
        HandlerError::Redeliver {
            delay,
            max_delay: DEFAULT_REDELIVERY_WINDOW,
            source: None,
        }
    }

    /// Attach the underlying cause; it is re-raised when the window
    /// expires.
    pub fn caused_by(self, cause: impl Into<BoxError>) -> Self {
        match self {
            HandlerError::Redeliver { delay, max_delay, .. } => HandlerError::Redeliver {
                delay,
                max_delay,
                source: Some(cause.into()),
            },
            other => other,
        }
    }

    /// Override the redelivery window.
    pub fn give_up_after(self, max_delay: Duration) -> Self {
        match self {
            HandlerError::Redeliver { delay, source, .. } => HandlerError::Redeliver {
                delay,
                max_delay,
                source,
            },
            other => other,
        }
    }

    pub fn other(cause: impl Into<BoxError>) -> Self {
        HandlerError::Other(cause.into())
    }
}

/// Terminal dispatch failures reported to the owning task.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Ack/nak or another broker call failed mid-dispatch
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The handler kept requesting redelivery past the event's window
    #[error("Redelivery window exhausted for {subject}")]
    RedeliveryExpired {
        subject: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The handler failed with a non-redelivery error
    #[error("Handler failed for {subject}")]
    Handler {
        subject: String,
        #[source]
        source: BoxError,
    },
}

impl DispatchError {
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, DispatchError::Broker(BrokerError::ConnectionClosed))
    }
}
