//! # ThreadRunner: flavour runner for blocking payloads.
//!
//! Every supervised payload gets its own OS thread; the supervision loop runs
//! on the thread that called [`run`](FlavourRunner::run) and only reacts to
//! signals:
//!
//! ```text
//! register(p) ──► Signal::Spawn ──┐
//! payload exit ─► Signal::Exited ─┼──► run() loop ──► spawn thread / abort / stop
//! stop()      ──► Signal::Stop  ──┘
//! ```
//!
//! ## Rules
//! - Payload threads are detached: `stop` never preempts them, they keep running
//!   until they return on their own (or the process exits)
//! - Signals are FIFO, so payloads registered before `run` are all started
//!   before any of their exits is observed
//! - After an orphaned return the loop keeps listening for
//!   [`RunnerConfig::settle`] and prefers a genuine failure found meanwhile
//! - One-shot payloads run on their own thread and ignore the supervision state

use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::core::runner::{conclude, publish_finished, publish_payload};
use crate::core::{FlavourRunner, Flavour, RunnerConfig, RunnerState};
use crate::error::{Anomaly, Cause, RunnerError};
use crate::events::{Bus, Event, EventKind};
use crate::payloads::{BlockingFn, Body, Payload, PayloadKind, PayloadResult};

const FLAVOUR: Flavour = Flavour::Threaded;

enum Signal {
    Spawn(Cow<'static, str>, BlockingFn<PayloadResult>),
    Exited(Anomaly),
    Stop,
}

/// Flavour runner executing blocking payloads on OS threads.
pub struct ThreadRunner {
    cfg: RunnerConfig,
    bus: Bus,
    state: Mutex<RunnerState>,
    tx: mpsc::Sender<Signal>,
    rx: Mutex<Option<mpsc::Receiver<Signal>>>,
}

impl ThreadRunner {
    /// Creates an idle runner publishing to `bus`.
    pub fn new(cfg: RunnerConfig, bus: Bus) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            cfg,
            bus,
            state: Mutex::new(RunnerState::Idle),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RunnerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `Idle -> Running`, handing the signal receiver to the caller.
    fn begin(&self) -> Result<mpsc::Receiver<Signal>, RunnerError> {
        let mut state = self.lock_state();
        state.begin(FLAVOUR.as_label())?;
        let rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner).take();
        match rx {
            Some(rx) => Ok(rx),
            None => {
                *state = RunnerState::Aborted;
                Err(RunnerError::Terminated {
                    runner: FLAVOUR.as_label(),
                    state: RunnerState::Aborted,
                })
            }
        }
    }

    /// Waits for the first anomaly or a stop request.
    fn supervise(&self, rx: &mpsc::Receiver<Signal>) -> Option<Anomaly> {
        loop {
            match rx.recv() {
                Ok(Signal::Spawn(name, f)) => {
                    if let Err(anomaly) = self.spawn_supervised(name, f) {
                        return Some(anomaly);
                    }
                }
                Ok(Signal::Exited(anomaly)) => return Some(self.settle(rx, anomaly)),
                Ok(Signal::Stop) | Err(_) => return None,
            }
        }
    }

    /// Gives a sibling's failure the chance to replace an orphaned return.
    fn settle(&self, rx: &mpsc::Receiver<Signal>, first: Anomaly) -> Anomaly {
        let window = match self.cfg.settle_window() {
            Some(window) if first.cause().is_orphaned_return() => window,
            _ => return first,
        };
        let deadline = Instant::now() + window;
        let mut verdict = first;

        while verdict.cause().is_orphaned_return() {
            let left = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(left) {
                Ok(Signal::Exited(next)) => verdict = verdict.prefer(next),
                // the runner is aborting: late registrations and stop requests are moot
                Ok(Signal::Spawn(..) | Signal::Stop) => {}
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }
        verdict
    }

    /// Starts one supervised payload on its own thread.
    fn spawn_supervised(
        &self,
        name: Cow<'static, str>,
        f: BlockingFn<PayloadResult>,
    ) -> Result<(), Anomaly> {
        let thread = self.cfg.thread_name(&name);
        let tx = self.tx.clone();
        let bus = self.bus.clone();
        let payload = name.clone();

        publish_payload(&self.bus, EventKind::PayloadStarting, FLAVOUR, &name);
        let spawned = self.cfg.thread_builder(thread).spawn(move || {
            let res = panic::catch_unwind(AssertUnwindSafe(f));
            let anomaly = conclude(&bus, FLAVOUR, &payload, res);
            let _ = tx.send(Signal::Exited(anomaly));
        });

        spawned.map(drop).map_err(|source| {
            let cause = Cause::Failed(Box::new(source));
            Anomaly::new(FLAVOUR, name, cause)
        })
    }

    /// Records the terminal state and publishes the matching event.
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
        publish_finished(&self.bus, Some(FLAVOUR), &res);
        res
    }
}

impl Default for ThreadRunner {
    fn default() -> Self {
        Self::new(RunnerConfig::default(), Bus::silent())
    }
}

impl FlavourRunner for ThreadRunner {
    fn flavour(&self) -> Flavour {
        FLAVOUR
    }

    fn state(&self) -> RunnerState {
        *self.lock_state()
    }

    fn register(&self, payload: Payload) -> Result<(), RunnerError> {
        let (name, body) = payload.into_parts();
        let Body::Blocking(f) = body else {
            return Err(RunnerError::FlavourMismatch {
                flavour: FLAVOUR,
                payload: name.into_owned(),
                kind: PayloadKind::Cooperative,
            });
        };

        let state = self.lock_state();
        state.ensure_open(FLAVOUR.as_label())?;
        publish_payload(&self.bus, EventKind::PayloadRegistered, FLAVOUR, &name);
        self.tx
            .send(Signal::Spawn(name, f))
            .map_err(|_| RunnerError::Terminated {
                runner: FLAVOUR.as_label(),
                state: *state,
            })
    }

    fn submit(&self, job: Payload<()>) -> Result<(), RunnerError> {
        let (name, body) = job.into_parts();
        let Body::Blocking(f) = body else {
            return Err(RunnerError::FlavourMismatch {
                flavour: FLAVOUR,
                payload: name.into_owned(),
                kind: PayloadKind::Cooperative,
            });
        };
        self.lock_state().ensure_open(FLAVOUR.as_label())?;

        let thread = self.cfg.thread_name(&name);
        let bus = self.bus.clone();
        publish_payload(&self.bus, EventKind::OneShotStarting, FLAVOUR, &name);
        self.cfg
            .thread_builder(thread.clone())
            .spawn(move || {
                f();
                publish_payload(&bus, EventKind::OneShotFinished, FLAVOUR, &name);
            })
            .map(drop)
            .map_err(|source| RunnerError::Spawn { thread, source })
    }

    fn run(&self) -> Result<(), RunnerError> {
        let rx = self.begin()?;
        self.bus
            .publish(Event::new(EventKind::RunnerStarting).with_flavour(FLAVOUR));
        let outcome = self.supervise(&rx);
        self.finish(outcome)
    }

    fn stop(&self) {
        let mut state = self.lock_state();
        match *state {
            RunnerState::Idle => {
                *state = RunnerState::Stopped;
                drop(state);
                publish_finished(&self.bus, Some(FLAVOUR), &Ok(()));
            }
            RunnerState::Running => {
                self.bus
                    .publish(Event::new(EventKind::StopRequested).with_flavour(FLAVOUR));
                let _ = self.tx.send(Signal::Stop);
            }
            RunnerState::Stopped | RunnerState::Aborted => {}
        }
    }
}
