//! # Non-blocking event fan-out to multiple subscribers.
//!
//! Provides [`SubscriberSet`], which distributes events to multiple subscribers
//! concurrently without blocking the publishing runner.
//!
//! ## Architecture
//! ```text
//! emit(event)
//!     │
//!     ├──► [queue 1] ──► worker thread 1 ──► subscriber1.on_event()
//!     │    (bounded)              └────────► panic → SubscriberPanicked
//!     ├──► [queue 2] ──► worker thread 2 ──► subscriber2.on_event()
//!     │    (bounded)
//!     └──► [queue N] ──► worker thread N ──► subscriberN.on_event()
//!          (bounded)
//! ```
//!
//! ## Rules
//! - **No cross-subscriber ordering**: subscriber A may process event N while B processes N+5
//! - **Overflow**: event dropped for that subscriber only, `SubscriberOverflow` emitted
//! - **Non-blocking**: `emit_arc()` returns immediately (uses `try_send`)
//! - **Isolation**: slow/panicking subscriber doesn't affect others
//! - **Per-subscriber FIFO**: each subscriber sees events in order
//! - **Lifetime**: workers exit once the set is dropped (queues close)
//!
//! ## Panic handling
//! Workers use `catch_unwind` to isolate panics:
//! - Panic is caught and converted to a `SubscriberPanicked` event
//! - Worker continues processing next event
//!
//! **Warning**: `AssertUnwindSafe` is used, which can leave shared state inconsistent
//! if subscriber uses `Arc<Mutex<T>>` and panics while holding the lock.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use tokio::sync::mpsc;

use crate::core::{RunnerConfig, panic_message};
use crate::error::RunnerError;
use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Per-subscriber channel metadata.
struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator for multiple event subscribers.
///
/// Manages per-subscriber queues and worker threads, providing:
/// - **Concurrent delivery**: events sent to all subscribers simultaneously
/// - **Isolation**: each subscriber has dedicated queue and worker
/// - **Panic safety**: panics caught and reported, don't crash the runners
/// - **Overflow handling**: dropped events reported via `SubscriberOverflow`
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker thread per subscriber.
    ///
    /// ### Per-subscriber setup
    /// - Bounded queue (capacity from [`Subscribe::queue_capacity`], minimum 1)
    /// - Dedicated worker thread named `{thread_prefix}-sub-{name}`
    /// - Panic isolation via `catch_unwind`
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, cfg: &RunnerConfig) -> Result<Arc<Self>, RunnerError> {
        let mut channels = Vec::with_capacity(subs.len());
        let mut pending = Vec::with_capacity(subs.len());

        for sub in subs {
            let (tx, rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));
            channels.push(SubscriberChannel {
                name: sub.name(),
                sender: tx,
            });
            pending.push((sub, rx));
        }

        let set = Arc::new(Self { channels });
        for (sub, rx) in pending {
            let weak = Arc::downgrade(&set);
            let thread = cfg.thread_name(&format!("sub-{}", sub.name()));
            cfg.thread_builder(thread.clone())
                .spawn(move || deliver(sub, rx, weak))
                .map_err(|source| RunnerError::Spawn { thread, source })?;
        }
        Ok(set)
    }

    /// Number of subscribers in the set.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns `true` if the set has no subscribers.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Emits an event to all subscribers (clones the event).
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Emits a pre-allocated `Arc<Event>` to all subscribers.
    ///
    /// - Uses `try_send` (non-blocking)
    /// - On queue full: drops event, emits `SubscriberOverflow`
    /// - On queue closed: emits `SubscriberOverflow` with reason "closed"
    ///
    /// ### Overflow prevention
    /// `SubscriberOverflow` events are not re-emitted if they themselves overflow.
    pub fn emit_arc(&self, event: Arc<Event>) {
        let is_overflow_evt = matches!(event.kind, EventKind::SubscriberOverflow);

        for channel in &self.channels {
            let reason = match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if !is_overflow_evt {
                self.emit_arc(Arc::new(Event::subscriber_overflow(channel.name, reason)));
            }
        }
    }
}

/// Worker loop of one subscriber; ends when the set is dropped.
fn deliver(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, set: Weak<SubscriberSet>) {
    while let Some(ev) = rx.blocking_recv() {
        let res = panic::catch_unwind(AssertUnwindSafe(|| sub.on_event(ev.as_ref())));
        if let Err(panic_err) = res {
            let info = panic_message(panic_err.as_ref());
            if let Some(set) = set.upgrade() {
                set.emit_arc(Arc::new(Event::subscriber_panicked(sub.name(), info)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    struct Forward {
        name: &'static str,
        tx: Mutex<std_mpsc::Sender<EventKind>>,
    }

    impl Subscribe for Forward {
        fn on_event(&self, event: &Event) {
            if let Ok(tx) = self.tx.lock() {
                let _ = tx.send(event.kind);
            }
        }
        fn name(&self) -> &'static str {
            self.name
        }
    }

    struct Explode;

    impl Subscribe for Explode {
        fn on_event(&self, event: &Event) {
            if event.kind == EventKind::PayloadFailed {
                panic!("subscriber exploded");
            }
        }
        fn name(&self) -> &'static str {
            "explode"
        }
    }

    fn forward(name: &'static str) -> (Arc<Forward>, std_mpsc::Receiver<EventKind>) {
        let (tx, rx) = std_mpsc::channel();
        (
            Arc::new(Forward {
                name,
                tx: Mutex::new(tx),
            }),
            rx,
        )
    }

    #[test]
    fn every_subscriber_sees_every_event() {
        let (a, rx_a) = forward("a");
        let (b, rx_b) = forward("b");
        let set = SubscriberSet::new(vec![a, b], &RunnerConfig::default()).unwrap();
        assert_eq!(set.len(), 2);

        set.emit(&Event::new(EventKind::RunnerStarting));
        set.emit(&Event::new(EventKind::RunnerStopped));

        for rx in [rx_a, rx_b] {
            let wait = Duration::from_secs(5);
            assert_eq!(rx.recv_timeout(wait).unwrap(), EventKind::RunnerStarting);
            assert_eq!(rx.recv_timeout(wait).unwrap(), EventKind::RunnerStopped);
        }
    }

    #[test]
    fn panicking_subscriber_is_reported_to_others() {
        let (watch, rx) = forward("watch");
        let set = SubscriberSet::new(vec![Arc::new(Explode), watch], &RunnerConfig::default()).unwrap();

        set.emit(&Event::new(EventKind::PayloadFailed));

        let wait = Duration::from_secs(5);
        assert_eq!(rx.recv_timeout(wait).unwrap(), EventKind::PayloadFailed);
        assert_eq!(rx.recv_timeout(wait).unwrap(), EventKind::SubscriberPanicked);
    }

    #[test]
    fn empty_set_accepts_events() {
        let set = SubscriberSet::new(Vec::new(), &RunnerConfig::default()).unwrap();
        assert!(set.is_empty());
        set.emit(&Event::new(EventKind::RunnerStarting));
    }
}
