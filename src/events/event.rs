//! # Runtime events emitted by the runners.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Payload events**: supervised payload flow (registered, starting, failed, returned, cancelled)
//! - **One-shot events**: `run_payload` executions
//! - **Runner events**: lifecycle of flavour runners and the meta runner
//! - **Subscriber events**: delivery problems inside the [`SubscriberSet`](crate::SubscriberSet)
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use flavourvisor::{Event, EventKind, Flavour};
//!
//! let ev = Event::new(EventKind::PayloadFailed)
//!     .with_flavour(Flavour::Tokio)
//!     .with_payload("poller")
//!     .with_reason("connection refused");
//!
//! assert_eq!(ev.kind, EventKind::PayloadFailed);
//! assert_eq!(ev.payload.as_deref(), Some("poller"));
//! assert_eq!(ev.flavour, Some(Flavour::Tokio));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::core::Flavour;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `payload`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `payload`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Payload events ===
    /// Supervised payload accepted by a runner.
    ///
    /// Sets: `flavour`, `payload`
    PayloadRegistered,

    /// Supervised payload is about to execute.
    ///
    /// Sets: `flavour`, `payload`
    PayloadStarting,

    /// Supervised payload returned an error or panicked.
    ///
    /// Sets: `flavour`, `payload`, `reason`
    PayloadFailed,

    /// Supervised payload returned normally (orphaned return).
    ///
    /// Sets: `flavour`, `payload`
    PayloadReturned,

    /// Supervised payload was unwound by cooperative cancellation.
    ///
    /// Sets: `flavour`, `payload`
    PayloadCancelled,

    // === One-shot events ===
    /// One-shot payload is about to execute.
    ///
    /// Sets: `flavour`, `payload`
    OneShotStarting,

    /// One-shot payload completed (its value is handed to the caller).
    ///
    /// Sets: `flavour`, `payload`
    OneShotFinished,

    // === Runner events ===
    /// A runner entered `Running`.
    ///
    /// Sets: `flavour` (absent for the meta runner)
    RunnerStarting,

    /// A runner reached `Stopped`.
    ///
    /// Sets: `flavour` (absent for the meta runner)
    RunnerStopped,

    /// A runner reached `Aborted`.
    ///
    /// Sets: `flavour` (absent for the meta runner), `payload`, `reason`
    RunnerAborted,

    /// `stop()` was requested on a running runner.
    ///
    /// Sets: `flavour` (absent for the meta runner)
    StopRequested,

    /// The meta runner observed the first anomaly and starts tearing down.
    ///
    /// Sets: `flavour` (of the failing runner), `reason`
    AnomalyDetected,

    /// A sibling runner reported an error while being torn down after an anomaly.
    ///
    /// Sets: `flavour`, `reason`
    TeardownFailed,
}

impl EventKind {
    /// Returns a short stable label (kebab-case) for log lines.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::SubscriberPanicked => "subscriber-panicked",
            EventKind::SubscriberOverflow => "subscriber-overflow",
            EventKind::PayloadRegistered => "registered",
            EventKind::PayloadStarting => "starting",
            EventKind::PayloadFailed => "failed",
            EventKind::PayloadReturned => "returned",
            EventKind::PayloadCancelled => "cancelled",
            EventKind::OneShotStarting => "one-shot-starting",
            EventKind::OneShotFinished => "one-shot-finished",
            EventKind::RunnerStarting => "runner-starting",
            EventKind::RunnerStopped => "runner-stopped",
            EventKind::RunnerAborted => "runner-aborted",
            EventKind::StopRequested => "stop-requested",
            EventKind::AnomalyDetected => "anomaly-detected",
            EventKind::TeardownFailed => "teardown-failed",
        }
    }
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Flavour of the runner that emitted the event, if any.
    pub flavour: Option<Flavour>,
    /// Payload (or subscriber) name, if applicable.
    pub payload: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            flavour: None,
            payload: None,
            reason: None,
        }
    }

    /// Attaches the emitting runner's flavour.
    #[inline]
    pub fn with_flavour(mut self, flavour: Flavour) -> Self {
        self.flavour = Some(flavour);
        self
    }

    /// Attaches a payload name.
    #[inline]
    pub fn with_payload(mut self, payload: impl Into<Arc<str>>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_payload(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_payload(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::RunnerStarting);
        let b = Event::new(EventKind::RunnerStopped);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn overflow_helper() {
        let ev = Event::subscriber_overflow("audit", "full");
        assert!(ev.is_subscriber_overflow());
        assert_eq!(ev.payload.as_deref(), Some("audit"));
        assert_eq!(ev.reason.as_deref(), Some("subscriber=audit reason=full"));
    }
}
