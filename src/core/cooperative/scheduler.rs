//! # Single-threaded schedulers behind the cooperative runners.
//!
//! A [`Scheduler`] is created on the thread that calls `run` and never leaves
//! it, so payload futures may be `!Send`.
//!
//! - [`TokioScheduler`]: current-thread tokio runtime driving a [`LocalSet`];
//!   payloads may use `tokio::time`, `tokio::net` and `tokio::task::spawn_local`.
//! - [`LocalPoolScheduler`]: `futures::executor::LocalPool`; payloads must not
//!   depend on a tokio reactor.

use std::future::Future;
use std::io;

use futures::executor::LocalPool;
use tokio::runtime;
use tokio::task::LocalSet;

use crate::core::{Flavour, RunnerConfig};

/// A single-threaded cooperative executor.
///
/// Dropping the scheduler drops every task it still owns.
pub trait Scheduler: Sized + 'static {
    /// Flavour served by this scheduler.
    const FLAVOUR: Flavour;

    /// Builds a fresh scheduler on the calling thread.
    fn create(cfg: &RunnerConfig) -> io::Result<Self>;

    /// Drives `fut` (and everything it spawns) until `fut` completes.
    fn block_on<F: Future>(&mut self, fut: F) -> F::Output;
}

/// Tokio current-thread runtime plus a [`LocalSet`] for `!Send` tasks.
pub struct TokioScheduler {
    // dropped before the runtime so local tasks never outlive their reactor
    local: LocalSet,
    rt: runtime::Runtime,
}

impl Scheduler for TokioScheduler {
    const FLAVOUR: Flavour = Flavour::Tokio;

    fn create(cfg: &RunnerConfig) -> io::Result<Self> {
        let mut builder = runtime::Builder::new_current_thread();
        if cfg.tokio_enable_all {
            builder.enable_all();
        }
        let rt = builder
            .thread_name(cfg.thread_name(Self::FLAVOUR.as_label()))
            .build()?;
        Ok(Self {
            local: LocalSet::new(),
            rt,
        })
    }

    fn block_on<F: Future>(&mut self, fut: F) -> F::Output {
        self.local.block_on(&self.rt, fut)
    }
}

/// `futures` local pool.
pub struct LocalPoolScheduler {
    pool: LocalPool,
}

impl Scheduler for LocalPoolScheduler {
    const FLAVOUR: Flavour = Flavour::LocalPool;

    fn create(_cfg: &RunnerConfig) -> io::Result<Self> {
        Ok(Self {
            pool: LocalPool::new(),
        })
    }

    fn block_on<F: Future>(&mut self, fut: F) -> F::Output {
        self.pool.run_until(fut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn tokio_scheduler_hosts_local_tasks_and_timers() {
        let mut sched = TokioScheduler::create(&RunnerConfig::default()).unwrap();
        let out = sched.block_on(async {
            let local = tokio::task::spawn_local(async { 20 });
            tokio::time::sleep(Duration::from_millis(1)).await;
            local.await.unwrap() + 22
        });
        assert_eq!(out, 42);
    }

    #[test]
    fn tokio_scheduler_without_drivers() {
        let cfg = RunnerConfig {
            tokio_enable_all: false,
            ..RunnerConfig::default()
        };
        let mut sched = TokioScheduler::create(&cfg).unwrap();
        assert_eq!(sched.block_on(async { "plain" }), "plain");
    }

    #[test]
    fn local_pool_scheduler_runs_futures() {
        let mut sched = LocalPoolScheduler::create(&RunnerConfig::default()).unwrap();
        let rc = std::rc::Rc::new(5);
        let out = sched.block_on(async move { *rc * 2 });
        assert_eq!(out, 10);
    }
}
