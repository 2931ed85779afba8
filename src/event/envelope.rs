use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use super::EventSet;

/// Generic envelope shared by every event published on a stream.
///
/// Subscriptions that do not care about a typed model set can consume
/// this form directly; it implements [`EventSet`] with the envelope's
/// own `name` as the discriminator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub uuid: Uuid,
    pub name: String,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

impl EventEnvelope {
    /// Epoch timestamp (seconds) of the event time.
    pub fn timestamp(&self) -> i64 {
        self.time.timestamp()
    }
}

impl EventSet for EventEnvelope {
    fn event_name(&self) -> &str {
        &self.name
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.time
    }
}
