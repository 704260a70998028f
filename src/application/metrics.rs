//! Observability metrics for throttling and delivery.
//!
//! Counters are updated on the hot path with relaxed atomics and can be read
//! at any time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking throttle and delivery statistics.
///
/// Cloning is cheap; clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Events handed to the notifier
    events_submitted: AtomicU64,
    /// Events let through by the throttle
    events_notified: AtomicU64,
    /// Events suppressed by the throttle
    events_suppressed: AtomicU64,
    /// Events skipped because the active profile is muted
    events_ignored: AtomicU64,
    /// Events dropped before delivery (no channel, no renderer, render error)
    events_dropped: AtomicU64,
    /// Signatures evicted from the registry
    signatures_evicted: AtomicU64,
    /// Channel calls that returned `Ok(true)`
    deliveries_succeeded: AtomicU64,
    /// Channel calls that returned `Ok(false)`, an error, or panicked
    deliveries_failed: AtomicU64,
    /// Queued delivery tasks discarded because the queue was full
    tasks_discarded: AtomicU64,
}

macro_rules! counter {
    ($record:ident, $read:ident, $field:ident) => {
        pub(crate) fn $record(&self) {
            self.inner.$field.fetch_add(1, Ordering::Relaxed);
        }

        #[doc = concat!("Current value of `", stringify!($field), "`.")]
        pub fn $read(&self) -> u64 {
            self.inner.$field.load(Ordering::Relaxed)
        }
    };
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    counter!(record_submitted, events_submitted, events_submitted);
    counter!(record_notified, events_notified, events_notified);
    counter!(record_suppressed, events_suppressed, events_suppressed);
    counter!(record_ignored, events_ignored, events_ignored);
    counter!(record_dropped, events_dropped, events_dropped);
    counter!(record_eviction, signatures_evicted, signatures_evicted);
    counter!(record_delivered, deliveries_succeeded, deliveries_succeeded);
    counter!(record_delivery_failed, deliveries_failed, deliveries_failed);
    counter!(record_discarded, tasks_discarded, tasks_discarded);

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_submitted: self.events_submitted(),
            events_notified: self.events_notified(),
            events_suppressed: self.events_suppressed(),
            events_ignored: self.events_ignored(),
            events_dropped: self.events_dropped(),
            signatures_evicted: self.signatures_evicted(),
            deliveries_succeeded: self.deliveries_succeeded(),
            deliveries_failed: self.deliveries_failed(),
            tasks_discarded: self.tasks_discarded(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        let inner = &self.inner;
        for counter in [
            &inner.events_submitted,
            &inner.events_notified,
            &inner.events_suppressed,
            &inner.events_ignored,
            &inner.events_dropped,
            &inner.signatures_evicted,
            &inner.deliveries_succeeded,
            &inner.deliveries_failed,
            &inner.tasks_discarded,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Events handed to the notifier
    pub events_submitted: u64,
    /// Events let through by the throttle
    pub events_notified: u64,
    /// Events suppressed by the throttle
    pub events_suppressed: u64,
    /// Events skipped because the active profile is muted
    pub events_ignored: u64,
    /// Events dropped before delivery
    pub events_dropped: u64,
    /// Signatures evicted from the registry
    pub signatures_evicted: u64,
    /// Successful channel calls
    pub deliveries_succeeded: u64,
    /// Failed channel calls
    pub deliveries_failed: u64,
    /// Delivery tasks discarded by a full queue
    pub tasks_discarded: u64,
}

impl MetricsSnapshot {
    /// Ratio of suppressed events to throttled events (0.0 to 1.0).
    ///
    /// Returns 0.0 if no events have been throttled.
    pub fn suppression_rate(&self) -> f64 {
        let total = self.events_notified.saturating_add(self.events_suppressed);
        if total == 0 {
            0.0
        } else {
            self.events_suppressed as f64 / total as f64
        }
    }

    /// Total channel calls that finished, either way.
    pub fn total_deliveries(&self) -> u64 {
        self.deliveries_succeeded
            .saturating_add(self.deliveries_failed)
    }
}
