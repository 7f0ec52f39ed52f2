//! # MetaRunner: one flavour runner per backend, one combined lifecycle.
//!
//! The [`MetaRunner`] owns a registry of flavour runners keyed by [`Flavour`],
//! creates them lazily on first use and drives each one on its own thread.
//!
//! ## Architecture
//! ```text
//! register(p, flavour) ──► runner(flavour) ──► FlavourRunner::register
//!                              │ (created lazily; launched at once if running)
//!                              ▼
//! run():
//!   [thread {prefix}-threaded]   ThreadRunner::run()      ──┐
//!   [thread {prefix}-tokio]      TokioRunner::run()       ──┼──► Signal::Exited ──► run loop
//!   [thread {prefix}-local-pool] LocalPoolRunner::run()   ──┘
//!
//! First anomaly:
//!   state = Aborted ─► stop() every runner ─► AnomalyDetected
//!                   ─► wait until every driver thread reported back
//!                   ─► RunnerAborted ─► return the first anomaly unchanged
//! ```
//!
//! ## Rules
//! - The first runner error wins; errors seen while tearing down are published
//!   as `TeardownFailed` and never replace it
//! - `stop` is issued to every runner before `run` returns
//! - A runner that reports [`RunnerError::Terminated`] or
//!   [`RunnerError::AlreadyRunning`] is counted as a clean exit
//! - Threaded payload threads are detached and never waited for; a cooperative
//!   payload that never yields stalls `run` (known limitation, no timeouts)

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::core::runner::publish_finished;
use crate::core::{
    FlavourRunner, Flavour, LocalPoolRunner, MetaRunnerBuilder, RunPayload, RunnerConfig,
    RunnerState, ThreadRunner, TokioRunner, panic_message,
};
use crate::error::{Anomaly, Cause, RunnerError};
use crate::events::{Bus, Event, EventKind};
use crate::payloads::{Payload, PayloadResult};

const META: &str = "meta";

enum Signal {
    Launch(Arc<dyn FlavourRunner>),
    Exited(Flavour, Result<(), RunnerError>),
    Stop,
}

struct Inner {
    state: RunnerState,
    runners: BTreeMap<Flavour, Arc<dyn FlavourRunner>>,
}

/// Coordinator of flavour runners.
///
/// `Send + Sync`: `run` blocks one thread while `register`, `run_payload` and
/// `stop` may be called from any other.
///
/// # Example
/// ```rust
/// use flavourvisor::{Flavour, MetaRunner, Payload, RunnerState};
///
/// let meta = MetaRunner::new();
/// let sum = meta
///     .run_payload(Payload::blocking("sum", || 2 + 2), Flavour::Threaded)
///     .unwrap();
/// assert_eq!(sum, 4);
///
/// let greeting = meta
///     .run_payload(Payload::cooperative("greet", || async { "hello" }), Flavour::Tokio)
///     .unwrap();
/// assert_eq!(greeting, "hello");
///
/// meta.stop();
/// assert_eq!(meta.state(), RunnerState::Stopped);
/// ```
pub struct MetaRunner {
    cfg: RunnerConfig,
    bus: Bus,
    inner: Mutex<Inner>,
    tx: mpsc::Sender<Signal>,
    rx: Mutex<Option<mpsc::Receiver<Signal>>>,
}

impl MetaRunner {
    /// Creates a meta runner with default configuration and no subscribers.
    pub fn new() -> Self {
        Self::from_parts(RunnerConfig::default(), Bus::silent())
    }

    /// Returns a builder for configuration and event subscribers.
    pub fn builder(cfg: RunnerConfig) -> MetaRunnerBuilder {
        MetaRunnerBuilder::new(cfg)
    }

    pub(crate) fn from_parts(cfg: RunnerConfig, bus: Bus) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            cfg,
            bus,
            inner: Mutex::new(Inner {
                state: RunnerState::Idle,
                runners: BTreeMap::new(),
            }),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunnerState {
        self.lock().state
    }

    /// Flavours that already have a runner, in [`Flavour`] order.
    pub fn flavours(&self) -> Vec<Flavour> {
        self.lock().runners.keys().copied().collect()
    }

    /// Returns the runner for `flavour`, creating it on first use.
    ///
    /// A runner created while the meta runner is running is launched right away.
    ///
    /// ### Errors
    /// [`RunnerError::Terminated`] once the meta runner is stopped or aborted.
    pub fn runner(&self, flavour: Flavour) -> Result<Arc<dyn FlavourRunner>, RunnerError> {
        let mut inner = self.lock();
        inner.state.ensure_open(META)?;
        if let Some(runner) = inner.runners.get(&flavour) {
            return Ok(Arc::clone(runner));
        }

        let runner = self.create(flavour);
        inner.runners.insert(flavour, Arc::clone(&runner));
        if inner.state == RunnerState::Running {
            let _ = self.tx.send(Signal::Launch(Arc::clone(&runner)));
        }
        Ok(runner)
    }

    fn create(&self, flavour: Flavour) -> Arc<dyn FlavourRunner> {
        let (cfg, bus) = (self.cfg.clone(), self.bus.clone());
        match flavour {
            Flavour::Threaded => Arc::new(ThreadRunner::new(cfg, bus)),
            Flavour::Tokio => Arc::new(TokioRunner::new(cfg, bus)),
            Flavour::LocalPool => Arc::new(LocalPoolRunner::new(cfg, bus)),
        }
    }

    /// Registers a supervised payload under `flavour`.
    pub fn register(&self, payload: Payload, flavour: Flavour) -> Result<(), RunnerError> {
        self.runner(flavour)?.register(payload)
    }

    /// Registers several supervised payloads under `flavour`, stopping at the first error.
    pub fn register_all<I>(&self, payloads: I, flavour: Flavour) -> Result<(), RunnerError>
    where
        I: IntoIterator<Item = Payload<PayloadResult>>,
    {
        let runner = self.runner(flavour)?;
        payloads
            .into_iter()
            .try_for_each(|payload| runner.register(payload))
    }

    /// Executes a one-shot payload under `flavour` and returns its value.
    ///
    /// See [`RunPayload::run_payload`]; the result is passed through unchanged.
    pub fn run_payload<T: Send + 'static>(
        &self,
        payload: Payload<T>,
        flavour: Flavour,
    ) -> Result<T, RunnerError> {
        self.runner(flavour)?.run_payload(payload)
    }

    /// Drives every flavour runner until the first anomaly or `stop`.
    ///
    /// Blocks the calling thread.
    ///
    /// ### Returns
    /// - `Ok(())` after `stop` with no anomaly (state `Stopped`)
    /// - the first runner error otherwise (state `Aborted`); for payload
    ///   failures and orphaned returns this is [`RunnerError::Anomaly`]
    pub fn run(&self) -> Result<(), RunnerError> {
        let (rx, runners) = self.begin()?;
        self.bus.publish(Event::new(EventKind::RunnerStarting));

        let mut active = 0usize;
        for runner in runners {
            if let Err(err) = self.launch(runner) {
                return self.abort(&rx, active, err);
            }
            active += 1;
        }

        let mut stopping = false;
        loop {
            match rx.recv() {
                Ok(Signal::Launch(runner)) if stopping => runner.stop(),
                Ok(Signal::Launch(runner)) => match self.launch(runner) {
                    Ok(()) => active += 1,
                    Err(err) => return self.abort(&rx, active, err),
                },
                Ok(Signal::Exited(_, res)) => {
                    active -= 1;
                    match res {
                        Err(err) if !is_clean_exit(&err) => return self.abort(&rx, active, err),
                        _ if stopping && active == 0 => return self.finish_stopped(&rx),
                        _ => {}
                    }
                }
                Ok(Signal::Stop) => {
                    if !stopping {
                        stopping = true;
                        self.stop_runners(self.snapshot());
                    }
                    if active == 0 {
                        return self.finish_stopped(&rx);
                    }
                }
                Err(mpsc::RecvError) => return self.finish_stopped(&rx),
            }
        }
    }

    /// Requests termination of every runner. Idempotent.
    ///
    /// - `Idle`: stops every runner right away, state `Stopped`
    /// - `Running`: `run` stops every runner and returns `Ok(())` once they
    ///   all exited, unless an anomaly got there first
    /// - `Stopped` / `Aborted`: no-op
    pub fn stop(&self) {
        let mut inner = self.lock();
        match inner.state {
            RunnerState::Idle => {
                inner.state = RunnerState::Stopped;
                let runners: Vec<_> = inner.runners.values().cloned().collect();
                drop(inner);
                self.stop_runners(runners);
                publish_finished(&self.bus, None, &Ok(()));
            }
            RunnerState::Running => {
                drop(inner);
                self.bus.publish(Event::new(EventKind::StopRequested));
                let _ = self.tx.send(Signal::Stop);
            }
            RunnerState::Stopped | RunnerState::Aborted => {}
        }
    }

    fn begin(&self) -> Result<(mpsc::Receiver<Signal>, Vec<Arc<dyn FlavourRunner>>), RunnerError> {
        let mut inner = self.lock();
        inner.state.begin(META)?;
        let rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner).take();
        match rx {
            Some(rx) => Ok((rx, inner.runners.values().cloned().collect())),
            None => {
                inner.state = RunnerState::Aborted;
                Err(RunnerError::Terminated {
                    runner: META,
                    state: RunnerState::Aborted,
                })
            }
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn FlavourRunner>> {
        self.lock().runners.values().cloned().collect()
    }

    fn stop_runners(&self, runners: Vec<Arc<dyn FlavourRunner>>) {
        for runner in runners {
            runner.stop();
        }
    }

    /// Drives `runner` on a dedicated thread that reports back with `Signal::Exited`.
    fn launch(&self, runner: Arc<dyn FlavourRunner>) -> Result<(), RunnerError> {
        let flavour = runner.flavour();
        let thread = self.cfg.thread_name(flavour.as_label());
        let tx = self.tx.clone();

        self.cfg
            .thread_builder(thread.clone())
            .spawn(move || {
                let res = panic::catch_unwind(AssertUnwindSafe(|| runner.run()))
                    .unwrap_or_else(|panic_err| {
                        let cause = Cause::Panicked(panic_message(panic_err.as_ref()));
                        Err(Anomaly::new(flavour, flavour.as_label(), cause).into())
                    });
                let _ = tx.send(Signal::Exited(flavour, res));
            })
            .map(drop)
            .map_err(|source| RunnerError::Spawn { thread, source })
    }

    fn finish_stopped(&self, rx: &mpsc::Receiver<Signal>) -> Result<(), RunnerError> {
        self.lock().state = RunnerState::Stopped;
        stop_queued(rx);
        publish_finished(&self.bus, None, &Ok(()));
        Ok(())
    }

    /// Tears everything down after the first error and returns it.
    fn abort(
        &self,
        rx: &mpsc::Receiver<Signal>,
        mut active: usize,
        primary: RunnerError,
    ) -> Result<(), RunnerError> {
        let runners = {
            let mut inner = self.lock();
            inner.state = RunnerState::Aborted;
            inner.runners.values().cloned().collect()
        };
        self.stop_runners(runners);
        self.bus.publish(detected(&primary));

        while active > 0 {
            match rx.recv() {
                Ok(Signal::Exited(flavour, res)) => {
                    active -= 1;
                    match res {
                        Err(err) if !is_clean_exit(&err) => self.bus.publish(
                            Event::new(EventKind::TeardownFailed)
                                .with_flavour(flavour)
                                .with_reason(err.as_message()),
                        ),
                        _ => {}
                    }
                }
                Ok(Signal::Launch(runner)) => runner.stop(),
                Ok(Signal::Stop) => {}
                Err(mpsc::RecvError) => break,
            }
        }
        stop_queued(rx);

        let res = Err(primary);
        publish_finished(&self.bus, None, &res);
        res
    }
}

impl Default for MetaRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetaRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("MetaRunner")
            .field("state", &inner.state)
            .field("flavours", &inner.runners.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Runner exits that do not count as an anomaly.
fn is_clean_exit(err: &RunnerError) -> bool {
    matches!(
        err,
        RunnerError::Terminated { .. } | RunnerError::AlreadyRunning { .. }
    )
}

/// Stops runners that were created but never launched.
fn stop_queued(rx: &mpsc::Receiver<Signal>) {
    while let Ok(signal) = rx.try_recv() {
        if let Signal::Launch(runner) = signal {
            runner.stop();
        }
    }
}

fn detected(primary: &RunnerError) -> Event {
    let ev = Event::new(EventKind::AnomalyDetected).with_reason(primary.as_message());
    match primary.anomaly() {
        Some(anomaly) => ev
            .with_flavour(anomaly.flavour())
            .with_payload(anomaly.payload()),
        None => ev,
    }
}
