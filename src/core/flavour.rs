//! # Backend identifiers.
//!
//! A [`Flavour`] names one concurrency backend. Payloads registered under the
//! same flavour share one flavour runner (and its execution context); payloads
//! under different flavours never share scheduling state.
//!
//! | Flavour       | Execution context                                  | Payload kind  |
//! |---------------|----------------------------------------------------|---------------|
//! | `Threaded`    | one OS thread per payload                          | blocking      |
//! | `Tokio`       | tokio current-thread runtime + `LocalSet`          | cooperative   |
//! | `LocalPool`   | `futures::executor::LocalPool`                     | cooperative   |

use std::fmt;

use crate::payloads::PayloadKind;

/// Identifier of a concurrency backend.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Flavour {
    /// Blocking payloads, each on a dedicated OS thread.
    Threaded,
    /// Cooperative payloads on a single-threaded tokio runtime.
    Tokio,
    /// Cooperative payloads on a `futures` local pool.
    LocalPool,
}

impl Flavour {
    /// Every known flavour, in declaration order.
    pub const ALL: [Flavour; 3] = [Flavour::Threaded, Flavour::Tokio, Flavour::LocalPool];

    /// Returns a short stable label (kebab-case) for use in logs, thread names and errors.
    ///
    /// # Example
    /// ```
    /// use flavourvisor::Flavour;
    ///
    /// assert_eq!(Flavour::LocalPool.as_label(), "local-pool");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            Flavour::Threaded => "threaded",
            Flavour::Tokio => "tokio",
            Flavour::LocalPool => "local-pool",
        }
    }

    /// The payload body kind this backend executes.
    pub fn payload_kind(&self) -> PayloadKind {
        match self {
            Flavour::Threaded => PayloadKind::Blocking,
            Flavour::Tokio | Flavour::LocalPool => PayloadKind::Cooperative,
        }
    }
}

impl fmt::Display for Flavour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}
