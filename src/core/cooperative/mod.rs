//! # CooperativeRunner: flavour runner for single-threaded schedulers.
//!
//! One driver future, executed by a [`Scheduler`] on the thread that called
//! `run`, owns every supervised payload future and every in-flight one-shot job:
//!
//! ```text
//! register(p) ──► Signal::Spawn  ──┐                ┌─► supervised: FuturesUnordered<payload>
//! submit(job) ──► Signal::Submit ──┼──► driver ─────┤
//! stop()      ──► token.cancel() ──┘                └─► jobs:       FuturesUnordered<one-shot>
//! ```
//!
//! ## Rules
//! - Signals already queued when the driver wakes are accepted in one batch, so
//!   payloads registered before `run` are all polled before any exit is observed
//! - The first completed payload ends supervision; if it merely returned, the
//!   remaining payloads get one more poll (repeated only while further orphaned
//!   returns come out of it) and a failure completing in that poll wins. A
//!   payload that needs further polls to fail loses to the orphaned return
//! - On stop or abort the driver drops every payload future, so payloads end at
//!   their current yield point and publish `PayloadCancelled`
//! - One-shot jobs submitted while idle run on a transient scheduler on the
//!   caller's thread

use std::borrow::Cow;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::LocalBoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::runner::{conclude, publish_finished, publish_payload};
use crate::core::{FlavourRunner, Flavour, RunnerConfig, RunnerState};
use crate::error::{Anomaly, RunnerError};
use crate::events::{Bus, Event, EventKind};
use crate::payloads::{Body, CooperativeFn, Payload, PayloadKind, PayloadResult};

mod scheduler;

pub use scheduler::{LocalPoolScheduler, Scheduler, TokioScheduler};

/// Runner for cooperative payloads on a tokio current-thread runtime.
pub type TokioRunner = CooperativeRunner<TokioScheduler>;

/// Runner for cooperative payloads on a `futures` local pool.
pub type LocalPoolRunner = CooperativeRunner<LocalPoolScheduler>;

enum Signal {
    Spawn(Cow<'static, str>, CooperativeFn<PayloadResult>),
    Submit(Cow<'static, str>, CooperativeFn<()>),
}

/// Flavour runner executing cooperative payloads on scheduler `S`.
pub struct CooperativeRunner<S: Scheduler> {
    cfg: RunnerConfig,
    bus: Bus,
    state: Mutex<RunnerState>,
    tx: mpsc::UnboundedSender<Signal>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Signal>>>,
    token: CancellationToken,
    _scheduler: PhantomData<fn() -> S>,
}

impl<S: Scheduler> CooperativeRunner<S> {
    /// Creates an idle runner publishing to `bus`.
    pub fn new(cfg: RunnerConfig, bus: Bus) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            cfg,
            bus,
            state: Mutex::new(RunnerState::Idle),
            tx,
            rx: Mutex::new(Some(rx)),
            token: CancellationToken::new(),
            _scheduler: PhantomData,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RunnerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> Result<mpsc::UnboundedReceiver<Signal>, RunnerError> {
        let mut state = self.lock_state();
        state.begin(S::FLAVOUR.as_label())?;
        let rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner).take();
        match rx {
            Some(rx) => Ok(rx),
            None => {
                *state = RunnerState::Aborted;
                Err(RunnerError::Terminated {
                    runner: S::FLAVOUR.as_label(),
                    state: RunnerState::Aborted,
                })
            }
        }
    }

    fn mismatch(name: Cow<'static, str>) -> RunnerError {
        RunnerError::FlavourMismatch {
            flavour: S::FLAVOUR,
            payload: name.into_owned(),
            kind: PayloadKind::Blocking,
        }
    }

    /// Driver future: waits for the first anomaly or cancellation.
    async fn supervise(&self, rx: &mut mpsc::UnboundedReceiver<Signal>) -> Option<Anomaly> {
        let mut supervised: FuturesUnordered<LocalBoxFuture<'static, Anomaly>> =
            FuturesUnordered::new();
        let mut jobs: FuturesUnordered<LocalBoxFuture<'static, ()>> = FuturesUnordered::new();

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => return None,
                Some(anomaly) = supervised.next() => {
                    return Some(settle(&mut supervised, anomaly));
                }
                Some(()) = jobs.next() => {}
                Some(signal) = rx.recv() => {
                    let mut next = Some(signal);
                    while let Some(signal) = next {
                        match signal {
                            Signal::Spawn(name, f) => supervised.push(self.supervised(name, f)),
                            Signal::Submit(name, f) => jobs.push(self.one_shot(name, f)),
                        }
                        next = rx.try_recv().ok();
                    }
                }
            }
        }
    }

    /// Wraps a supervised body: catches panics, publishes its exit or cancellation.
    fn supervised(
        &self,
        name: Cow<'static, str>,
        f: CooperativeFn<PayloadResult>,
    ) -> LocalBoxFuture<'static, Anomaly> {
        publish_payload(&self.bus, EventKind::PayloadStarting, S::FLAVOUR, &name);
        let bus = self.bus.clone();
        let guard = CancelGuard {
            bus: bus.clone(),
            flavour: S::FLAVOUR,
            name: Some(name.clone()),
        };

        async move {
            let res = AssertUnwindSafe(async move { f().await })
                .catch_unwind()
                .await;
            guard.disarm();
            conclude(&bus, S::FLAVOUR, &name, res)
        }
        .boxed_local()
    }

    fn one_shot(
        &self,
        name: Cow<'static, str>,
        f: CooperativeFn<()>,
    ) -> LocalBoxFuture<'static, ()> {
        publish_payload(&self.bus, EventKind::OneShotStarting, S::FLAVOUR, &name);
        let bus = self.bus.clone();
        async move {
            f().await;
            publish_payload(&bus, EventKind::OneShotFinished, S::FLAVOUR, &name);
        }
        .boxed_local()
    }

    fn finish(&self, outcome: Option<Anomaly>) -> Result<(), RunnerError> {
        let res = {
            let mut state = self.lock_state();
            match outcome {
                None => {
                    *state = RunnerState::Stopped;
                    Ok(())
                }
                Some(anomaly) => {
                    *state = RunnerState::Aborted;
                    Err(RunnerError::Anomaly(anomaly))
                }
            }
        };
        publish_finished(&self.bus, Some(S::FLAVOUR), &res);
        res
    }

    /// Fails `run` before supervision started because the scheduler is unavailable.
    fn fail_backend(&self, source: std::io::Error) -> Result<(), RunnerError> {
        *self.lock_state() = RunnerState::Aborted;
        let res = Err(RunnerError::Backend {
            flavour: S::FLAVOUR,
            source,
        });
        publish_finished(&self.bus, Some(S::FLAVOUR), &res);
        res
    }
}

/// Gives the remaining payloads one more poll when the first anomaly is an
/// orphaned return; only a failure completing within that poll replaces it.
fn settle(
    supervised: &mut FuturesUnordered<LocalBoxFuture<'static, Anomaly>>,
    first: Anomaly,
) -> Anomaly {
    let mut verdict = first;
    while verdict.cause().is_orphaned_return() {
        match supervised.next().now_or_never() {
            Some(Some(next)) => verdict = verdict.prefer(next),
            Some(None) | None => break,
        }
    }
    verdict
}

/// Publishes `PayloadCancelled` when a supervised future is dropped unfinished.
struct CancelGuard {
    bus: Bus,
    flavour: Flavour,
    name: Option<Cow<'static, str>>,
}

impl CancelGuard {
    fn disarm(mut self) {
        self.name = None;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if let Some(name) = self.name.take() {
            publish_payload(&self.bus, EventKind::PayloadCancelled, self.flavour, &name);
        }
    }
}

impl<S: Scheduler> Default for CooperativeRunner<S> {
    fn default() -> Self {
        Self::new(RunnerConfig::default(), Bus::silent())
    }
}

impl<S: Scheduler> FlavourRunner for CooperativeRunner<S> {
    fn flavour(&self) -> Flavour {
        S::FLAVOUR
    }

    fn state(&self) -> RunnerState {
        *self.lock_state()
    }

    fn register(&self, payload: Payload) -> Result<(), RunnerError> {
        let (name, body) = payload.into_parts();
        let Body::Cooperative(f) = body else {
            return Err(Self::mismatch(name));
        };

        let state = self.lock_state();
        state.ensure_open(S::FLAVOUR.as_label())?;
        publish_payload(&self.bus, EventKind::PayloadRegistered, S::FLAVOUR, &name);
        self.tx
            .send(Signal::Spawn(name, f))
            .map_err(|_| RunnerError::Terminated {
                runner: S::FLAVOUR.as_label(),
                state: *state,
            })
    }

    fn submit(&self, job: Payload<()>) -> Result<(), RunnerError> {
        let (name, body) = job.into_parts();
        let Body::Cooperative(f) = body else {
            return Err(Self::mismatch(name));
        };

        let state = self.lock_state();
        match *state {
            RunnerState::Running => self
                .tx
                .send(Signal::Submit(name, f))
                .map_err(|_| RunnerError::Abandoned { flavour: S::FLAVOUR }),
            RunnerState::Idle => {
                drop(state);
                let mut scheduler = S::create(&self.cfg).map_err(|source| RunnerError::Backend {
                    flavour: S::FLAVOUR,
                    source,
                })?;
                scheduler.block_on(self.one_shot(name, f));
                Ok(())
            }
            terminal => Err(RunnerError::Terminated {
                runner: S::FLAVOUR.as_label(),
                state: terminal,
            }),
        }
    }

    fn run(&self) -> Result<(), RunnerError> {
        let mut rx = self.begin()?;
        let mut scheduler = match S::create(&self.cfg) {
            Ok(scheduler) => scheduler,
            Err(source) => return self.fail_backend(source),
        };

        self.bus
            .publish(Event::new(EventKind::RunnerStarting).with_flavour(S::FLAVOUR));
        let outcome = scheduler.block_on(self.supervise(&mut rx));
        self.finish(outcome)
    }

    fn stop(&self) {
        let mut state = self.lock_state();
        match *state {
            RunnerState::Idle => {
                *state = RunnerState::Stopped;
                drop(state);
                publish_finished(&self.bus, Some(S::FLAVOUR), &Ok(()));
            }
            RunnerState::Running => {
                if !self.token.is_cancelled() {
                    self.bus
                        .publish(Event::new(EventKind::StopRequested).with_flavour(S::FLAVOUR));
                    self.token.cancel();
                }
            }
            RunnerState::Stopped | RunnerState::Aborted => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RunPayload;
    use crate::error::Cause;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::task::Poll;
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, thiserror::Error)]
    #[error("terminate runner")]
    struct TerminateRunner;

    async fn yield_now() {
        let mut yielded = false;
        futures::future::poll_fn(|cx| {
            if yielded {
                Poll::Ready(())
            } else {
                yielded = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        })
        .await
    }

    async fn returns() -> PayloadResult {
        Ok(())
    }

    async fn aborts() -> PayloadResult {
        Err(TerminateRunner.into())
    }

    async fn spins() -> PayloadResult {
        loop {
            yield_now().await;
        }
    }

    async fn aborts_late() -> PayloadResult {
        yield_now().await;
        yield_now().await;
        Err(TerminateRunner.into())
    }

    async fn explodes() -> PayloadResult {
        yield_now().await;
        panic!("cooperative boom")
    }

    async fn spins_until_dropped(flag: Arc<AtomicBool>) -> PayloadResult {
        let _flag = SetOnDrop(flag);
        spins().await
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn spawn_run<S: Scheduler>(
        runner: &Arc<CooperativeRunner<S>>,
    ) -> thread::JoinHandle<Result<(), RunnerError>> {
        let driver = {
            let runner = runner.clone();
            thread::spawn(move || runner.run())
        };
        while runner.state() == RunnerState::Idle {
            thread::sleep(Duration::from_millis(1));
        }
        driver
    }

    fn run_payload_while_idle<S: Scheduler>() {
        let runner = CooperativeRunner::<S>::default();
        let value = runner
            .run_payload(Payload::cooperative("with_return", || async {
                yield_now().await;
                "expected return value"
            }))
            .unwrap();
        assert_eq!(value, "expected return value");
        assert_eq!(runner.state(), RunnerState::Idle);
    }

    fn run_payload_while_running<S: Scheduler>() {
        let runner = Arc::new(CooperativeRunner::<S>::default());
        let driver = spawn_run(&runner);

        let value = runner
            .run_payload(Payload::cooperative("answer", || async { 42 }))
            .unwrap();
        assert_eq!(value, 42);

        runner.stop();
        assert!(driver.join().unwrap().is_ok());
        assert_eq!(runner.state(), RunnerState::Stopped);
    }

    fn orphaned_return<S: Scheduler>() {
        let runner = CooperativeRunner::<S>::default();
        runner
            .register(Payload::cooperative("with_return", returns))
            .unwrap();
        let err = runner.run().unwrap_err();
        let anomaly = err.anomaly().unwrap();
        assert_eq!(anomaly.flavour(), S::FLAVOUR);
        assert!(anomaly.cause().is_orphaned_return());
        assert_eq!(runner.state(), RunnerState::Aborted);
    }

    fn failure_wins<S: Scheduler>() {
        let runner = CooperativeRunner::<S>::default();
        runner
            .register(Payload::cooperative("noop", returns))
            .unwrap();
        runner
            .register(Payload::cooperative("loop", spins))
            .unwrap();
        runner
            .register(Payload::cooperative("abort", aborts))
            .unwrap();

        let err = runner.run().unwrap_err();
        let anomaly = err.anomaly().unwrap();
        assert_eq!(anomaly.payload(), "abort");
        assert!(anomaly.cause().downcast_ref::<TerminateRunner>().is_some());
    }

    fn settle_window_is_one_poll<S: Scheduler>() {
        let runner = CooperativeRunner::<S>::default();
        runner
            .register(Payload::cooperative("noop", returns))
            .unwrap();
        runner
            .register(Payload::cooperative("abort", aborts_late))
            .unwrap();

        let err = runner.run().unwrap_err();
        let anomaly = err.anomaly().unwrap();
        assert_eq!(anomaly.payload(), "noop");
        assert!(anomaly.cause().is_orphaned_return());
    }

    fn panic_is_an_anomaly<S: Scheduler>() {
        let runner = CooperativeRunner::<S>::default();
        runner
            .register(Payload::cooperative("boom", explodes))
            .unwrap();
        let err = runner.run().unwrap_err();
        assert!(matches!(
            err.anomaly().unwrap().cause(),
            Cause::Panicked(msg) if msg == "cooperative boom"
        ));
    }

    fn stop_cancels_payloads<S: Scheduler>() {
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = dropped.clone();

        let runner = Arc::new(CooperativeRunner::<S>::default());
        runner
            .register(Payload::cooperative("loop", move || spins_until_dropped(flag)))
            .unwrap();
        let driver = spawn_run(&runner);

        runner.stop();
        runner.stop();
        assert!(driver.join().unwrap().is_ok());
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(runner.state(), RunnerState::Stopped);

        runner.stop();
        assert!(matches!(
            runner.register(Payload::cooperative("late", returns)),
            Err(RunnerError::Terminated { .. })
        ));
        assert!(matches!(
            runner.run_payload(Payload::cooperative("late", || async { 1 })),
            Err(RunnerError::Terminated { .. })
        ));
    }

    fn late_registration_is_supervised<S: Scheduler>() {
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = dropped.clone();

        let runner = Arc::new(CooperativeRunner::<S>::default());
        runner
            .register(Payload::cooperative("loop", move || spins_until_dropped(flag)))
            .unwrap();
        let driver = spawn_run(&runner);
        assert!(!dropped.load(Ordering::SeqCst));

        runner
            .register(Payload::cooperative("abort", aborts))
            .unwrap();
        let err = driver.join().unwrap().unwrap_err();
        let anomaly = err.anomaly().unwrap();
        assert_eq!(anomaly.payload(), "abort");
        assert!(anomaly.cause().downcast_ref::<TerminateRunner>().is_some());
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(runner.state(), RunnerState::Aborted);
    }

    fn blocking_payload_is_rejected<S: Scheduler>() {
        let runner = CooperativeRunner::<S>::default();
        let err = runner
            .register(Payload::blocking("sync", || Ok(())))
            .unwrap_err();
        assert!(matches!(
            err,
            RunnerError::FlavourMismatch {
                kind: PayloadKind::Blocking,
                ..
            }
        ));
    }

    macro_rules! scheduler_suite {
        ($($module:ident => $scheduler:ty),* $(,)?) => {$(
            mod $module {
                use super::*;

                #[test]
                fn run_payload_while_idle() {
                    super::run_payload_while_idle::<$scheduler>();
                }

                #[test]
                fn run_payload_while_running() {
                    super::run_payload_while_running::<$scheduler>();
                }

                #[test]
                fn orphaned_return() {
                    super::orphaned_return::<$scheduler>();
                }

                #[test]
                fn failure_wins() {
                    super::failure_wins::<$scheduler>();
                }

                #[test]
                fn settle_window_is_one_poll() {
                    super::settle_window_is_one_poll::<$scheduler>();
                }

                #[test]
                fn panic_is_an_anomaly() {
                    super::panic_is_an_anomaly::<$scheduler>();
                }

                #[test]
                fn stop_cancels_payloads() {
                    super::stop_cancels_payloads::<$scheduler>();
                }

                #[test]
                fn late_registration_is_supervised() {
                    super::late_registration_is_supervised::<$scheduler>();
                }

                #[test]
                fn blocking_payload_is_rejected() {
                    super::blocking_payload_is_rejected::<$scheduler>();
                }
            }
        )*};
    }

    scheduler_suite! {
        tokio_scheduler => TokioScheduler,
        local_pool_scheduler => LocalPoolScheduler,
    }

    async fn ticker() -> PayloadResult {
        let local = tokio::task::spawn_local(aborts());
        tokio::time::sleep(Duration::from_millis(5)).await;
        local.await?
    }

    #[test]
    fn tokio_payloads_use_timers_and_local_tasks() {
        let runner = TokioRunner::default();
        runner
            .register(Payload::cooperative("ticker", ticker))
            .unwrap();
        let err = runner.run().unwrap_err();
        assert!(
            err.anomaly()
                .unwrap()
                .cause()
                .downcast_ref::<TerminateRunner>()
                .is_some()
        );
    }
}
