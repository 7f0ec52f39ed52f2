//! # flavourvisor
//!
//! **Flavourvisor** supervises long-running payloads across heterogeneous
//! concurrency backends in one process.
//!
//! A payload is a named, argument-free unit of work. Supervised payloads are
//! expected to run forever: the first one that fails *or returns* aborts the
//! whole group, and `run` reports exactly one [`Anomaly`] describing why.
//! One-shot payloads run to completion and hand their value back to the caller.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     register(payload, Flavour::Threaded)   register(payload, Flavour::Tokio)   ...
//!                     │                                   │
//!                     ▼                                   ▼
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │  MetaRunner                                                               │
//! │  - registry Flavour -> FlavourRunner (created lazily)                     │
//! │  - one driver thread per flavour runner while running                     │
//! │  - first anomaly wins, stop() fans out to every runner                    │
//! └──────┬───────────────────────────┬───────────────────────────┬────────────┘
//!        ▼                           ▼                           ▼
//! ┌──────────────┐           ┌───────────────┐           ┌─────────────────┐
//! │ ThreadRunner │           │  TokioRunner  │           │ LocalPoolRunner │
//! │ thread per   │           │ current-thread│           │ futures         │
//! │ payload      │           │ rt + LocalSet │           │ LocalPool       │
//! └──────┬───────┘           └───────┬───────┘           └────────┬────────┘
//!        │ Publishes events: PayloadStarting, PayloadFailed,      │
//!        │ PayloadReturned, RunnerAborted, ...                    │
//!        ▼                           ▼                            ▼
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                         Bus ──► SubscriberSet                             │
//! └───────────────────────────────────┬───────────────────────────────────────┘
//!                          ┌──────────┼──────────┐
//!                          ▼          ▼          ▼
//!                       worker1    worker2    workerN ──► sub.on_event()
//! ```
//!
//! ### Lifecycle
//! ```text
//! Idle ──register──► Idle
//! Idle ──run───────► Running ──payload fails / returns──► Aborted (Err(Anomaly))
//!                        └─────stop()─────────────────────► Stopped (Ok(()))
//! Idle ──stop()────► Stopped
//! ```
//!
//! ## Features
//! | Area              | Description                                                 | Key types / traits                           |
//! |-------------------|-------------------------------------------------------------|----------------------------------------------|
//! | **Coordination**  | One lifecycle over every backend, first anomaly wins.       | [`MetaRunner`], [`MetaRunnerBuilder`]        |
//! | **Backends**      | Per-flavour execution and supervision.                      | [`FlavourRunner`], [`RunPayload`], [`Flavour`] |
//! | **Payloads**      | Blocking closures or cooperative future factories.          | [`Payload`], [`PayloadResult`]               |
//! | **Errors**        | Typed errors with the payload's own error as cause.         | [`RunnerError`], [`Anomaly`], [`Cause`]      |
//! | **Subscriber API**| Hook into payload and runner lifecycle events.              | [`Subscribe`], [`Event`], [`EventKind`]      |
//! | **Configuration** | Thread naming, stack size, tokio drivers, settle window.    | [`RunnerConfig`]                             |
//!
//! ## Optional features
//! - `logging`: exports a built-in [`LogWriter`] rendering events through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use flavourvisor::{Flavour, MetaRunner, Payload, PayloadResult, RunnerConfig};
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("upstream closed")]
//! struct UpstreamClosed;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Build subscribers (optional)
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn flavourvisor::Subscribe>> = vec![Arc::new(flavourvisor::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn flavourvisor::Subscribe>> = Vec::new();
//!
//!     let meta = MetaRunner::builder(RunnerConfig::default())
//!         .with_subscribers(subs)
//!         .build()?;
//!
//!     // One-shot work on any backend
//!     let port = meta.run_payload(Payload::blocking("pick-port", || 8080), Flavour::Threaded)?;
//!     assert_eq!(port, 8080);
//!
//!     // Supervised work: this one gives up after a while
//!     meta.register(
//!         Payload::cooperative("poller", || async {
//!             tokio::time::sleep(std::time::Duration::from_millis(10)).await;
//!             PayloadResult::Err(UpstreamClosed.into())
//!         }),
//!         Flavour::Tokio,
//!     )?;
//!
//!     let err = meta.run().unwrap_err();
//!     let anomaly = err.anomaly().expect("supervision aborted");
//!     assert_eq!(anomaly.payload(), "poller");
//!     assert!(anomaly.cause().downcast_ref::<UpstreamClosed>().is_some());
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod payloads;
mod subscribers;

// ---- Public re-exports ----

pub use crate::core::{
    CooperativeRunner, Flavour, FlavourRunner, LocalPoolRunner, LocalPoolScheduler, MetaRunner,
    MetaRunnerBuilder, RunPayload, RunnerConfig, RunnerState, Scheduler, ThreadRunner, TokioRunner,
    TokioScheduler,
};
pub use error::{Anomaly, Cause, RunnerError};
pub use events::{Bus, Event, EventKind};
pub use payloads::{Payload, PayloadError, PayloadKind, PayloadResult};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
