//! # Payloads: named, no-argument units of work.
//!
//! A [`Payload`] wraps a closure that is called exactly once. The body is either
//! *blocking* (runs on an OS thread) or *cooperative* (the closure creates a
//! future that is driven by a single-threaded scheduler).
//!
//! ## Usage modes
//! - **Supervised**: `Payload<PayloadResult>`, registered with a runner and
//!   expected to run forever. `Err(e)` and `Ok(())` both abort supervision.
//! - **One-shot**: any `Payload<T>`, handed to `run_payload`; the caller gets `T`.
//!
//! Cooperative closures must be `Send` (they are handed to the runner's thread)
//! but the futures they create may be `!Send`: they never leave that thread.
//!
//! ## Example
//! ```rust
//! use flavourvisor::{Payload, PayloadKind, PayloadResult};
//!
//! let service: Payload = Payload::blocking("heartbeat", || -> PayloadResult {
//!     loop {
//!         std::thread::sleep(std::time::Duration::from_secs(1));
//!     }
//! });
//! assert_eq!(service.name(), "heartbeat");
//! assert_eq!(service.kind(), PayloadKind::Blocking);
//!
//! let answer = Payload::cooperative("answer", || async { 42 });
//! assert_eq!(answer.kind(), PayloadKind::Cooperative);
//! ```

use std::borrow::Cow;
use std::fmt;
use std::future::Future;

use futures::FutureExt;
use futures::future::LocalBoxFuture;

/// Error a supervised payload may return.
pub type PayloadError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Return type of a supervised payload.
pub type PayloadResult = Result<(), PayloadError>;

pub(crate) type BlockingFn<T> = Box<dyn FnOnce() -> T + Send + 'static>;
pub(crate) type CooperativeFn<T> = Box<dyn FnOnce() -> LocalBoxFuture<'static, T> + Send + 'static>;

/// Which kind of backend a payload body needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    /// A plain closure, executed on an OS thread.
    Blocking,
    /// A future factory, executed by a single-threaded scheduler.
    Cooperative,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PayloadKind::Blocking => "blocking",
            PayloadKind::Cooperative => "cooperative",
        })
    }
}

pub(crate) enum Body<T> {
    Blocking(BlockingFn<T>),
    Cooperative(CooperativeFn<T>),
}

/// A named unit of work with no arguments.
///
/// Defaults to the supervised shape (`T = PayloadResult`).
pub struct Payload<T = PayloadResult> {
    name: Cow<'static, str>,
    body: Body<T>,
}

impl<T: 'static> Payload<T> {
    /// Creates a payload executed on an OS thread.
    pub fn blocking<F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self {
            name: name.into(),
            body: Body::Blocking(Box::new(f)),
        }
    }

    /// Creates a payload whose closure produces a future for a cooperative scheduler.
    ///
    /// The closure is invoked on the scheduler's thread, right before the future
    /// is first polled.
    pub fn cooperative<F, Fut>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + 'static,
    {
        Self {
            name: name.into(),
            body: Body::Cooperative(Box::new(move || f().boxed_local())),
        }
    }
}

impl<T> Payload<T> {
    pub(crate) fn from_parts(name: Cow<'static, str>, body: Body<T>) -> Self {
        Self { name, body }
    }

    /// Returns the payload name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the body kind.
    pub fn kind(&self) -> PayloadKind {
        match self.body {
            Body::Blocking(_) => PayloadKind::Blocking,
            Body::Cooperative(_) => PayloadKind::Cooperative,
        }
    }

    pub(crate) fn into_parts(self) -> (Cow<'static, str>, Body<T>) {
        (self.name, self.body)
    }
}

impl<T> fmt::Debug for Payload<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocking_body_runs_once() {
        let payload = Payload::blocking("sum", || 2 + 2);
        assert_eq!(payload.kind(), PayloadKind::Blocking);
        let (name, body) = payload.into_parts();
        assert_eq!(name, "sum");
        match body {
            Body::Blocking(f) => assert_eq!(f(), 4),
            Body::Cooperative(_) => panic!("expected a blocking body"),
        }
    }

    #[test]
    fn cooperative_factory_is_lazy() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};

        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let payload = Payload::cooperative("lazy", move || {
            flag.store(true, Ordering::SeqCst);
            async { "done" }
        });
        assert!(!called.load(Ordering::SeqCst));

        let (_, body) = payload.into_parts();
        let Body::Cooperative(f) = body else {
            panic!("expected a cooperative body");
        };
        let out = futures::executor::block_on(f());
        assert!(called.load(Ordering::SeqCst));
        assert_eq!(out, "done");
    }

    #[test]
    fn debug_shows_name_and_kind() {
        let payload: Payload = Payload::blocking("svc", || Ok(()));
        let text = format!("{payload:?}");
        assert!(text.contains("svc"));
        assert!(text.contains("Blocking"));
    }
}
