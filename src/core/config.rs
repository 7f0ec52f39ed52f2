//! # Runner configuration.
//!
//! Provides [`RunnerConfig`] centralized settings shared by the meta runner and
//! every flavour runner it creates.
//!
//! ## Sentinel values
//! - `stack_size = 0` → platform default stack size for payload threads
//! - `settle = 0s` → report the first anomaly immediately

use std::borrow::Cow;
use std::thread;
use std::time::Duration;

/// Global configuration for the runners.
///
/// ## Field semantics
/// - `thread_prefix`: prefix of every thread the crate spawns
/// - `stack_size`: payload thread stack size in bytes (`0` = platform default)
/// - `tokio_enable_all`: enable IO and time drivers on tokio schedulers
/// - `settle`: how long a threaded runner keeps listening for a genuine failure
///   after the first anomaly turned out to be an orphaned return
///
/// ## Notes
/// All fields are public for flexibility. Prefer using helper accessors to avoid
/// sprinkling sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Prefix of thread names (`{prefix}-{what}`).
    pub thread_prefix: Cow<'static, str>,

    /// Stack size of payload threads.
    ///
    /// - `0` = platform default
    /// - `n > 0` = `n` bytes
    pub stack_size: usize,

    /// Whether tokio schedulers enable their IO and time drivers.
    ///
    /// Payloads that use `tokio::time` need this.
    pub tokio_enable_all: bool,

    /// Settle window after an orphaned return on the threaded flavour.
    ///
    /// Payloads registered together start together; when one returns and a
    /// sibling fails right after, the failure is the more useful cause.
    pub settle: Duration,
}

impl RunnerConfig {
    /// Returns the payload thread stack size as an `Option`.
    ///
    /// - `None` → platform default
    /// - `Some(n)` → `n` bytes
    #[inline]
    pub fn stack_size(&self) -> Option<usize> {
        if self.stack_size == 0 {
            None
        } else {
            Some(self.stack_size)
        }
    }

    /// Returns the settle window as an `Option`.
    ///
    /// - `None` → the first anomaly is final
    /// - `Some(d)` → keep listening for up to `d`
    #[inline]
    pub fn settle_window(&self) -> Option<Duration> {
        if self.settle.is_zero() {
            None
        } else {
            Some(self.settle)
        }
    }

    /// Full name of a thread spawned for `what`.
    pub(crate) fn thread_name(&self, what: &str) -> String {
        format!("{}-{what}", self.thread_prefix)
    }

    /// Thread builder with the configured name and stack size.
    pub(crate) fn thread_builder(&self, name: String) -> thread::Builder {
        let builder = thread::Builder::new().name(name);
        match self.stack_size() {
            Some(size) => builder.stack_size(size),
            None => builder,
        }
    }
}

impl Default for RunnerConfig {
    /// Default configuration:
    ///
    /// - `thread_prefix = "flavourvisor"`
    /// - `stack_size = 0` (platform default)
    /// - `tokio_enable_all = true`
    /// - `settle = 50ms`
    fn default() -> Self {
        Self {
            thread_prefix: Cow::Borrowed("flavourvisor"),
            stack_size: 0,
            tokio_enable_all: true,
            settle: Duration::from_millis(50),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_map_to_none() {
        let cfg = RunnerConfig {
            settle: Duration::ZERO,
            ..RunnerConfig::default()
        };
        assert_eq!(cfg.stack_size(), None);
        assert_eq!(cfg.settle_window(), None);

        let cfg = RunnerConfig {
            stack_size: 1 << 20,
            ..RunnerConfig::default()
        };
        assert_eq!(cfg.stack_size(), Some(1 << 20));
        assert_eq!(cfg.settle_window(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn thread_names_carry_prefix() {
        let cfg = RunnerConfig {
            thread_prefix: "svc".into(),
            ..RunnerConfig::default()
        };
        assert_eq!(cfg.thread_name("tokio"), "svc-tokio");
    }
}
