//! # Runner lifecycle state.
//!
//! Shared by flavour runners and the meta runner:
//!
//! ```text
//! Idle ──register──► Idle
//! Idle ──run───────► Running ──payload fails / returns──► Aborted
//!                        └─────stop()─────────────────────► Stopped
//! Idle ──stop()────► Stopped
//! ```
//!
//! `Stopped` and `Aborted` are terminal.

use std::fmt;

use crate::error::RunnerError;

/// Lifecycle state of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunnerState {
    /// Created; accepts registrations, not yet supervising.
    Idle,
    /// `run` is active.
    Running,
    /// Stopped on request without any anomaly.
    Stopped,
    /// Supervision ended because a payload failed or returned.
    Aborted,
}

impl RunnerState {
    /// Returns `true` for `Stopped` and `Aborted`.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, RunnerState::Stopped | RunnerState::Aborted)
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            RunnerState::Idle => "idle",
            RunnerState::Running => "running",
            RunnerState::Stopped => "stopped",
            RunnerState::Aborted => "aborted",
        }
    }

    /// Performs the `Idle -> Running` transition for the runner labelled `runner`.
    pub(crate) fn begin(&mut self, runner: &'static str) -> Result<(), RunnerError> {
        match *self {
            RunnerState::Idle => {
                *self = RunnerState::Running;
                Ok(())
            }
            RunnerState::Running => Err(RunnerError::AlreadyRunning { runner }),
            state => Err(RunnerError::Terminated { runner, state }),
        }
    }

    /// Rejects work once terminal.
    pub(crate) fn ensure_open(self, runner: &'static str) -> Result<(), RunnerError> {
        if self.is_terminal() {
            Err(RunnerError::Terminated {
                runner,
                state: self,
            })
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_only_from_idle() {
        let mut state = RunnerState::Idle;
        assert!(state.begin("test").is_ok());
        assert_eq!(state, RunnerState::Running);

        assert!(matches!(
            state.begin("test"),
            Err(RunnerError::AlreadyRunning { runner: "test" })
        ));

        let mut stopped = RunnerState::Stopped;
        assert!(matches!(
            stopped.begin("test"),
            Err(RunnerError::Terminated {
                state: RunnerState::Stopped,
                ..
            })
        ));
        assert_eq!(stopped, RunnerState::Stopped);
    }

    #[test]
    fn terminal_states_reject_work() {
        assert!(RunnerState::Idle.ensure_open("test").is_ok());
        assert!(RunnerState::Running.ensure_open("test").is_ok());
        assert!(RunnerState::Stopped.ensure_open("test").is_err());
        assert!(RunnerState::Aborted.ensure_open("test").is_err());
    }
}
