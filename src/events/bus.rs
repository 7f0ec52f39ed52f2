//! # Event bus for publishing runtime events.
//!
//! [`Bus`] is the handle every runner publishes through. It hands events
//! straight to a [`SubscriberSet`], which queues them per subscriber and
//! returns immediately.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                    Fan-out:
//!   ThreadRunner       ──┐
//!   TokioRunner        ──┼──► Bus ──► SubscriberSet ──► [queue S1] ──► worker thread S1
//!   LocalPoolRunner    ──┤                         └──► [queue SN] ──► worker thread SN
//!   MetaRunner         ──┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks (per-subscriber `try_send`).
//! - **Silent bus**: a bus without subscribers drops events immediately.
//! - **No persistence**: events are not stored or replayed.
//! - **Cloneable**: cheap to clone (`Arc` inside), shared by every runner of one meta runner.

use std::sync::Arc;

use super::event::Event;
use crate::subscribers::SubscriberSet;

/// Publishing handle for runtime events.
#[derive(Clone, Default)]
pub struct Bus {
    set: Option<Arc<SubscriberSet>>,
}

impl Bus {
    /// Creates a bus delivering to the given subscriber set.
    pub fn new(set: Arc<SubscriberSet>) -> Self {
        Self { set: Some(set) }
    }

    /// Creates a bus that drops every event.
    pub fn silent() -> Self {
        Self { set: None }
    }

    /// Returns `true` when nothing listens on this bus.
    pub fn is_silent(&self) -> bool {
        self.set.is_none()
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns immediately; a subscriber whose queue is full misses the event.
    pub fn publish(&self, ev: Event) {
        if let Some(set) = &self.set {
            set.emit_arc(Arc::new(ev));
        }
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("silent", &self.is_silent())
            .finish()
    }
}
