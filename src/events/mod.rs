//! Runtime events: types and publishing bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish runtime events emitted by the flavour runners and the meta runner.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and metadata
//! - [`Bus`] publishing handle feeding the [`SubscriberSet`](crate::SubscriberSet)
//!
//! ## Quick reference
//! - **Publishers**: `ThreadRunner`, `CooperativeRunner`, `MetaRunner`,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: user [`Subscribe`](crate::Subscribe) implementations.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
