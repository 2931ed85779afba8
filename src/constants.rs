use std::time::Duration;

// -
// Flow control

/// Number of recent fetch sizes retained for batch adaptation
pub(crate) const FETCH_HISTORY_LEN: usize = 10;

/// A history mean at or above this share of the batch size counts as
/// sustained saturation and grows the batch
pub(crate) const SATURATION_RATIO: f64 = 0.9;

/// Factor applied when growing or shrinking the fetch timeout
pub(crate) const TIMEOUT_ADAPT_FACTOR: u32 = 10;

/// Pause after an empty fetch before asking the broker again
pub(crate) const EMPTY_FETCH_PAUSE: Duration = Duration::from_millis(10);

/// Backoff after an unexpected fetch failure
pub(crate) const FETCH_ERROR_BACKOFF: Duration = Duration::from_secs(1);

// -
// Redelivery

/// Default delay a redelivery request asks the broker for
pub(crate) const DEFAULT_REDELIVERY_DELAY: Duration = Duration::from_secs(30);

/// Default window after which redelivery requests escalate to failures,
/// measured from the event's own timestamp
pub(crate) const DEFAULT_REDELIVERY_WINDOW: Duration = Duration::from_secs(300);
