//! Event model registry.
//!
//! Streams carry JSON events discriminated by a `name` field. A
//! subscription registers a closed set of accepted models as one
//! `#[serde(tag = "name")]` enum implementing [`EventSet`]; decoding
//! against that enum is the tagged-variant dispatch, and a decode
//! failure is a first-class outcome rather than a crash.

mod envelope;
pub use envelope::*;

use chrono::DateTime;
use chrono::Utc;
use serde::de::DeserializeOwned;

/// A closed set of event models a subscription accepts.
///
/// Typically derived on an internally tagged enum:
///
/// ```rust,no_run
/// use chrono::{DateTime, Utc};
/// use pulley::EventSet;
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize)]
/// #[serde(tag = "name")]
/// enum OrderEvents {
///     #[serde(rename = "order.created.v1")]
///     Created { time: DateTime<Utc>, order_id: u64 },
///     #[serde(rename = "order.cancelled.v1")]
///     Cancelled { time: DateTime<Utc>, order_id: u64 },
/// }
///
/// impl EventSet for OrderEvents {
///     fn event_name(&self) -> &str {
///         match self {
///             OrderEvents::Created { .. } => "order.created.v1",
///             OrderEvents::Cancelled { .. } => "order.cancelled.v1",
///         }
///     }
///
///     fn occurred_at(&self) -> DateTime<Utc> {
///         match self {
///             OrderEvents::Created { time, .. } => *time,
///             OrderEvents::Cancelled { time, .. } => *time,
///         }
///     }
/// }
/// ```
pub trait EventSet: DeserializeOwned + Send + Sync + 'static {
    /// Discriminator of the decoded variant, eg. `order.created.v1`
    fn event_name(&self) -> &str;

    /// Timestamp the publisher stamped on the event. Bounds how long
    /// handler-requested redelivery may keep retrying.
    fn occurred_at(&self) -> DateTime<Utc>;
}
