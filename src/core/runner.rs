//! # The flavour runner contract and single-execution helpers.
//!
//! [`FlavourRunner`] is the interface every backend adapter implements; the
//! [`RunPayload`] extension adds the typed one-shot entry point on top of it.
//!
//! The free functions here execute **one** payload body and translate its exit
//! into the runner vocabulary, publishing lifecycle events to [`Bus`]:
//!
//! ## Event flow
//!
//! ```text
//! Supervised:
//!   PayloadStarting → body → Ok(())        → PayloadReturned  → Cause::OrphanedReturn
//!                          → Err(e)        → PayloadFailed    → Cause::Failed(e)
//!                          → panic         → PayloadFailed    → Cause::Panicked(msg)
//!                          → (cancelled)   → PayloadCancelled → nothing reported
//!
//! One-shot:
//!   OneShotStarting → body → value / panic shipped to the caller → OneShotFinished
//! ```
//!
//! ## Rules
//! - Every supervised exit is an anomaly: these payloads never finish by contract
//! - Exactly **one** terminal event per supervised execution
//! - One-shot results travel on their own channel and never reach `run`

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use futures::FutureExt;
use tokio::sync::oneshot;

use crate::core::{Flavour, RunnerState};
use crate::error::{Anomaly, Cause, RunnerError};
use crate::events::{Bus, Event, EventKind};
use crate::payloads::{Body, Payload, PayloadResult};

/// # Per-backend execution and supervision unit.
///
/// One implementation per concurrency backend. The contract is identical
/// across backends; the mechanics underneath differ:
///
/// | Operation  | Threaded                                | Cooperative                                   |
/// |------------|-----------------------------------------|-----------------------------------------------|
/// | `register` | queue for the supervision loop          | queue for the driver loop                     |
/// | `submit`   | dedicated thread, independent of `run`  | driver loop if running, else a transient loop |
/// | `run`      | loop on the calling thread              | scheduler driven on the calling thread        |
/// | `stop`     | bookkeeping only, threads keep running  | cancellation at the next yield point          |
///
/// ### State machine
/// See [`RunnerState`]. `Stopped` and `Aborted` are terminal; calls that would
/// leave them are rejected with [`RunnerError::Terminated`].
pub trait FlavourRunner: Send + Sync + 'static {
    /// Backend this runner drives.
    fn flavour(&self) -> Flavour;

    /// Current lifecycle state.
    fn state(&self) -> RunnerState;

    /// Attaches a supervised payload.
    ///
    /// Allowed before and during `run`; a payload registered during `run` is
    /// started by the active loop without touching the running ones.
    /// Never blocks.
    fn register(&self, payload: Payload) -> Result<(), RunnerError>;

    /// Hands a type-erased one-shot job to the backend.
    ///
    /// The job delivers its own result; use [`RunPayload::run_payload`] instead
    /// of calling this directly.
    fn submit(&self, job: Payload<()>) -> Result<(), RunnerError>;

    /// Supervises registered payloads until one of them ends or `stop` is called.
    ///
    /// Blocks the calling thread.
    ///
    /// ### Returns
    /// - `Ok(())` after `stop` with no anomaly (state `Stopped`)
    /// - `Err(RunnerError::Anomaly)` when a payload failed or returned (state `Aborted`)
    fn run(&self) -> Result<(), RunnerError>;

    /// Requests termination. Idempotent.
    fn stop(&self);
}

/// Typed one-shot execution for every [`FlavourRunner`].
pub trait RunPayload: FlavourRunner {
    /// Executes `payload` to completion and returns its value.
    ///
    /// Blocks the calling thread; must not be called from inside a payload of
    /// the same cooperative runner. Payloads of other runners may call it. The payload's value (including an `Err` it
    /// returns) is handed back untouched and a panic is resumed on the caller.
    /// Does not change the runner's lifecycle state.
    ///
    /// ### Errors
    /// - [`RunnerError::Terminated`] once the runner is stopped or aborted
    /// - [`RunnerError::FlavourMismatch`] for a body the backend cannot execute
    /// - [`RunnerError::Abandoned`] if the runner shut down before completion
    fn run_payload<T: Send + 'static>(&self, payload: Payload<T>) -> Result<T, RunnerError> {
        let (job, done) = detach(payload);
        self.submit(job)?;
        match wait(done) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(panic_err)) => panic::resume_unwind(panic_err),
            Err(_dropped) => Err(RunnerError::Abandoned {
                flavour: self.flavour(),
            }),
        }
    }
}

impl<R: FlavourRunner + ?Sized> RunPayload for R {}

/// Blocks until a one-shot outcome arrives, whichever executor the caller runs on.
///
/// tokio rejects `blocking_recv` on a thread driving one of its runtimes, while
/// `futures` rejects nesting its own executors, so each side gets the other's wait.
fn wait<T>(done: oneshot::Receiver<T>) -> Result<T, oneshot::error::RecvError> {
    if tokio::runtime::Handle::try_current().is_ok() {
        futures::executor::block_on(done)
    } else {
        done.blocking_recv()
    }
}

/// Turns a typed payload into a job that ships its outcome over a oneshot channel.
pub(crate) fn detach<T: Send + 'static>(
    payload: Payload<T>,
) -> (Payload<()>, oneshot::Receiver<thread::Result<T>>) {
    let (tx, rx) = oneshot::channel();
    let (name, body) = payload.into_parts();

    let body = match body {
        Body::Blocking(f) => Body::Blocking(Box::new(move || {
            let _ = tx.send(panic::catch_unwind(AssertUnwindSafe(f)));
        })),
        Body::Cooperative(f) => Body::Cooperative(Box::new(move || {
            async move {
                let res = AssertUnwindSafe(async move { f().await })
                    .catch_unwind()
                    .await;
                let _ = tx.send(res);
            }
            .boxed_local()
        })),
    };
    (Payload::from_parts(name, body), rx)
}

/// Translates a supervised payload exit into its anomaly cause.
pub(crate) fn classify(res: thread::Result<PayloadResult>) -> Cause {
    match res {
        Ok(Ok(())) => Cause::OrphanedReturn,
        Ok(Err(err)) => Cause::Failed(err),
        Err(panic_err) => Cause::Panicked(panic_message(panic_err.as_ref())),
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(any: &(dyn Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Classifies the exit, publishes the terminal event and builds the anomaly.
pub(crate) fn conclude(
    bus: &Bus,
    flavour: Flavour,
    name: &str,
    res: thread::Result<PayloadResult>,
) -> Anomaly {
    let cause = classify(res);
    let ev = match &cause {
        Cause::OrphanedReturn => Event::new(EventKind::PayloadReturned),
        failure => Event::new(EventKind::PayloadFailed).with_reason(failure.to_string()),
    };
    bus.publish(ev.with_flavour(flavour).with_payload(name));
    Anomaly::new(flavour, name, cause)
}

/// Publishes a payload-scoped event.
pub(crate) fn publish_payload(bus: &Bus, kind: EventKind, flavour: Flavour, name: &str) {
    bus.publish(Event::new(kind).with_flavour(flavour).with_payload(name));
}

/// Publishes `RunnerStopped` or `RunnerAborted` for a finished run.
pub(crate) fn publish_finished(bus: &Bus, flavour: Option<Flavour>, res: &Result<(), RunnerError>) {
    let ev = match res {
        Ok(()) => Event::new(EventKind::RunnerStopped),
        Err(err) => {
            let ev = Event::new(EventKind::RunnerAborted).with_reason(err.as_message());
            match err.anomaly() {
                Some(anomaly) => ev.with_payload(anomaly.payload()),
                None => ev,
            }
        }
    };
    bus.publish(match flavour {
        Some(flavour) => ev.with_flavour(flavour),
        None => ev,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("terminate runner")]
    struct TerminateRunner;

    #[test]
    fn every_exit_is_an_anomaly() {
        assert!(classify(Ok(Ok(()))).is_orphaned_return());

        let failed = classify(Ok(Err(Box::new(TerminateRunner))));
        assert!(failed.downcast_ref::<TerminateRunner>().is_some());

        let panicked = classify(Err(Box::new("boom")));
        assert!(matches!(panicked, Cause::Panicked(ref msg) if msg == "boom"));
    }

    #[test]
    fn panic_messages() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "unknown panic");
    }

    #[test]
    fn detached_blocking_job_ships_value() {
        let (job, mut done) = detach(Payload::blocking("answer", || 42));
        assert_eq!(job.name(), "answer");
        let (_, body) = job.into_parts();
        let Body::Blocking(f) = body else {
            panic!("expected a blocking body");
        };
        f();
        assert_eq!(done.try_recv().unwrap().unwrap(), 42);
    }

    #[test]
    fn detached_cooperative_job_ships_panic() {
        let (job, mut done) = detach(Payload::cooperative("boom", || async {
            if true {
                panic!("one-shot exploded");
            }
            7
        }));
        let (_, body) = job.into_parts();
        let Body::Cooperative(f) = body else {
            panic!("expected a cooperative body");
        };
        futures::executor::block_on(f());
        let panic_err = done.try_recv().unwrap().unwrap_err();
        assert_eq!(panic_message(panic_err.as_ref()), "one-shot exploded");
    }

    #[test]
    fn wait_works_inside_a_tokio_runtime() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let (tx, rx) = oneshot::channel();
        tx.send(3).unwrap();
        assert_eq!(rt.block_on(async { wait(rx) }).unwrap(), 3);
    }

    #[test]
    fn wait_works_inside_a_local_pool() {
        let (tx, rx) = oneshot::channel::<u8>();
        drop(tx);
        let res = futures::executor::block_on(async { wait(rx) });
        assert!(res.is_err());
    }

    #[test]
    fn conclude_builds_anomaly() {
        let anomaly = conclude(&Bus::silent(), Flavour::Threaded, "svc", Ok(Ok(())));
        assert_eq!(anomaly.flavour(), Flavour::Threaded);
        assert_eq!(anomaly.payload(), "svc");
        assert!(anomaly.cause().is_orphaned_return());
    }
}
