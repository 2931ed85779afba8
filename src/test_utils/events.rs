use bytes::Bytes;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::event::EventSet;

/// Closed event set used across the consumer tests.
#[derive(Debug, Deserialize)]
#[serde(tag = "name")]
pub(crate) enum OrderEvents {
    #[serde(rename = "order.created.v1")]
    Created(OrderCreated),
    #[serde(rename = "order.cancelled.v1")]
    Cancelled(OrderCancelled),
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrderCreated {
    pub time: DateTime<Utc>,
    pub order_id: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrderCancelled {
    pub time: DateTime<Utc>,
    pub order_id: u64,
}

impl EventSet for OrderEvents {
    fn event_name(&self) -> &str {
        match self {
            OrderEvents::Created(_) => "order.created.v1",
            OrderEvents::Cancelled(_) => "order.cancelled.v1",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvents::Created(event) => event.time,
            OrderEvents::Cancelled(event) => event.time,
        }
    }
}

impl OrderEvents {
    pub(crate) fn order_id(&self) -> u64 {
        match self {
            OrderEvents::Created(event) => event.order_id,
            OrderEvents::Cancelled(event) => event.order_id,
        }
    }
}

pub(crate) fn order_created(order_id: u64) -> Bytes {
    order_created_at(order_id, Utc::now())
}

pub(crate) fn order_created_at(order_id: u64, time: DateTime<Utc>) -> Bytes {
    serde_json::json!({
        "name": "order.created.v1",
        "uuid": Uuid::new_v4(),
        "time": time,
        "order_id": order_id,
    })
    .to_string()
    .into()
}

pub(crate) fn order_cancelled(order_id: u64) -> Bytes {
    serde_json::json!({
        "name": "order.cancelled.v1",
        "uuid": Uuid::new_v4(),
        "time": Utc::now(),
        "order_id": order_id,
    })
    .to_string()
    .into()
}
