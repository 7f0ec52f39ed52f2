//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait and the [`SubscriberSet`] that
//! fans runtime events out to subscribers.
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Runner ── publish(Event) ──► Bus ──► SubscriberSet::emit_arc
//!                                              │
//!                                    ┌─────────┼─────────┐
//!                                    ▼         ▼         ▼
//!                                LogWriter  Metrics   Custom ...
//! ```
//!
//! Subscribers are attached through
//! [`MetaRunnerBuilder::with_subscribers`](crate::MetaRunnerBuilder::with_subscribers).

mod embedded;
mod subscribe;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
