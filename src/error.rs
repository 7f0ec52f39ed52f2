//! Error types used by the runners.
//!
//! This module defines:
//!
//! - [`RunnerError`]: everything a runner call can return.
//! - [`Anomaly`]: the single failure `run` surfaces when supervision aborts.
//! - [`Cause`]: why a supervised payload ended (error, orphaned return, panic).
//!
//! As in the rest of the crate, error enums provide `as_label` / `as_message`
//! helpers for logging.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::core::{Flavour, RunnerState};
use crate::payloads::{PayloadError, PayloadKind};

/// # Why a supervised payload ended.
///
/// Supervised payloads are contractually endless, so every variant is an anomaly.
#[derive(Error, Debug)]
pub enum Cause {
    /// The payload returned an error.
    #[error(transparent)]
    Failed(PayloadError),

    /// The payload returned normally although it must never terminate.
    #[error("orphaned return: supervised payload finished without error")]
    OrphanedReturn,

    /// The payload panicked.
    #[error("payload panicked: {0}")]
    Panicked(String),
}

impl Cause {
    /// Returns `true` for [`Cause::OrphanedReturn`].
    #[inline]
    pub fn is_orphaned_return(&self) -> bool {
        matches!(self, Cause::OrphanedReturn)
    }

    /// Returns `true` for a genuine failure (error or panic).
    #[inline]
    pub fn is_failure(&self) -> bool {
        !self.is_orphaned_return()
    }

    /// Returns the payload's own error, if it returned one.
    pub fn payload_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Cause::Failed(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    /// Downcasts the payload's own error to a concrete type.
    ///
    /// # Example
    /// ```
    /// use flavourvisor::Cause;
    ///
    /// let cause = Cause::Failed(Box::new(std::fmt::Error));
    /// assert!(cause.downcast_ref::<std::fmt::Error>().is_some());
    /// assert!(Cause::OrphanedReturn.downcast_ref::<std::fmt::Error>().is_none());
    /// ```
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.payload_error().and_then(|err| err.downcast_ref::<E>())
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            Cause::Failed(_) => "payload_failed",
            Cause::OrphanedReturn => "payload_orphaned_return",
            Cause::Panicked(_) => "payload_panicked",
        }
    }
}

/// # The failure that ends supervision.
///
/// Produced by a flavour runner when one of its supervised payloads ends and
/// passed through the meta runner unchanged: whichever anomaly is detected
/// first is the one the caller sees, and it is never merged with others.
///
/// Display names the payload only; the cause is the next link of the error
/// chain (the payload's own error for [`Cause::Failed`]).
#[derive(Debug)]
pub struct Anomaly {
    flavour: Flavour,
    payload: Arc<str>,
    cause: Cause,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} payload {:?} aborted supervision",
            self.flavour, self.payload
        )
    }
}

impl StdError for Anomaly {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.cause {
            Cause::Failed(err) => Some(err.as_ref()),
            other => Some(other),
        }
    }
}

impl Anomaly {
    pub(crate) fn new(flavour: Flavour, payload: impl Into<Arc<str>>, cause: Cause) -> Self {
        Self {
            flavour,
            payload: payload.into(),
            cause,
        }
    }

    /// Flavour of the runner that detected the anomaly.
    pub fn flavour(&self) -> Flavour {
        self.flavour
    }

    /// Name of the payload that ended.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Why the payload ended.
    pub fn cause(&self) -> &Cause {
        &self.cause
    }

    /// Consumes the anomaly and returns its cause.
    pub fn into_cause(self) -> Cause {
        self.cause
    }

    /// Picks the anomaly to report out of two detected in the same settle window.
    ///
    /// A genuine failure outranks an orphaned return; otherwise the earlier one stays.
    pub(crate) fn prefer(self, later: Anomaly) -> Anomaly {
        if self.cause.is_orphaned_return() && later.cause.is_failure() {
            later
        } else {
            self
        }
    }
}

/// # Errors produced by runner operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RunnerError {
    /// A supervised payload failed or returned; supervision was aborted.
    #[error(transparent)]
    Anomaly(#[from] Anomaly),

    /// The runner already reached a terminal state and accepts no more work.
    #[error("{runner} runner is {state}; no further work is accepted")]
    Terminated {
        /// Label of the runner (a flavour label or `"meta"`).
        runner: &'static str,
        /// The terminal state.
        state: RunnerState,
    },

    /// `run` was called while the runner was already running.
    #[error("{runner} runner is already running")]
    AlreadyRunning {
        /// Label of the runner (a flavour label or `"meta"`).
        runner: &'static str,
    },

    /// The payload body cannot execute on this backend.
    #[error("{kind} payload {payload:?} cannot run on the {flavour} runner")]
    FlavourMismatch {
        /// Flavour of the rejecting runner.
        flavour: Flavour,
        /// Name of the rejected payload.
        payload: String,
        /// Body kind of the rejected payload.
        kind: PayloadKind,
    },

    /// The runner shut down before a one-shot payload could complete.
    #[error("{flavour} runner shut down before the one-shot payload completed")]
    Abandoned {
        /// Flavour of the runner.
        flavour: Flavour,
    },

    /// The backend scheduler could not be constructed.
    #[error("failed to start the {flavour} scheduler: {source}")]
    Backend {
        /// Flavour of the runner.
        flavour: Flavour,
        /// Underlying construction error.
        #[source]
        source: io::Error,
    },

    /// An OS thread could not be spawned.
    #[error("failed to spawn thread {thread:?}: {source}")]
    Spawn {
        /// Requested thread name.
        thread: String,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },
}

impl RunnerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use flavourvisor::{Flavour, RunnerError};
    ///
    /// let err = RunnerError::Abandoned { flavour: Flavour::Tokio };
    /// assert_eq!(err.as_label(), "runner_abandoned");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RunnerError::Anomaly(anomaly) => anomaly.cause().as_label(),
            RunnerError::Terminated { .. } => "runner_terminated",
            RunnerError::AlreadyRunning { .. } => "runner_already_running",
            RunnerError::FlavourMismatch { .. } => "runner_flavour_mismatch",
            RunnerError::Abandoned { .. } => "runner_abandoned",
            RunnerError::Backend { .. } => "runner_backend",
            RunnerError::Spawn { .. } => "runner_spawn",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RunnerError::Anomaly(anomaly) => format!(
                "anomaly: flavour={} payload={} cause={}",
                anomaly.flavour(),
                anomaly.payload(),
                anomaly.cause()
            ),
            RunnerError::Terminated { runner, state } => {
                format!("terminated: runner={runner} state={state}")
            }
            RunnerError::AlreadyRunning { runner } => format!("already running: runner={runner}"),
            RunnerError::FlavourMismatch {
                flavour,
                payload,
                kind,
            } => format!("mismatch: flavour={flavour} payload={payload} kind={kind}"),
            RunnerError::Abandoned { flavour } => format!("abandoned: flavour={flavour}"),
            RunnerError::Backend { flavour, source } => {
                format!("backend: flavour={flavour} error={source}")
            }
            RunnerError::Spawn { thread, source } => format!("spawn: thread={thread} error={source}"),
        }
    }

    /// Returns the anomaly, if supervision was aborted.
    pub fn anomaly(&self) -> Option<&Anomaly> {
        match self {
            RunnerError::Anomaly(anomaly) => Some(anomaly),
            _ => None,
        }
    }
}
