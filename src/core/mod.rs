//! Runtime core: flavour runners and their coordinator.
//!
//! The public API of this module is the [`MetaRunner`] plus the
//! [`FlavourRunner`] implementations it drives, which can also be used on
//! their own.
//!
//! Internal modules:
//! - [`runner`]: the runner contract and single-execution helpers (classify, publish);
//! - [`threaded`]: OS thread per payload, supervision loop on the caller;
//! - [`cooperative`]: one driver future on a single-threaded scheduler;
//! - [`meta`]: lazy runner registry, first-anomaly-wins coordination;
//! - [`config`], [`flavour`], [`state`]: shared vocabulary.

mod builder;
mod config;
mod cooperative;
mod flavour;
mod meta;
mod runner;
mod state;
mod threaded;

pub use builder::MetaRunnerBuilder;
pub use config::RunnerConfig;
pub use cooperative::{
    CooperativeRunner, LocalPoolRunner, LocalPoolScheduler, Scheduler, TokioRunner, TokioScheduler,
};
pub use flavour::Flavour;
pub use meta::MetaRunner;
pub use runner::{FlavourRunner, RunPayload};
pub use state::RunnerState;
pub use threaded::ThreadRunner;

pub(crate) use runner::panic_message;
