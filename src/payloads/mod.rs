//! # Payload abstractions.
//!
//! - [`Payload`] - named closure, blocking or cooperative
//! - [`PayloadKind`] - which backend family a body needs
//! - [`PayloadResult`] / [`PayloadError`] - the supervised return shape

mod payload;

pub(crate) use payload::{BlockingFn, Body, CooperativeFn};
pub use payload::{Payload, PayloadError, PayloadKind, PayloadResult};
