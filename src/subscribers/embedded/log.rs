//! # LogWriter: event renderer on top of `tracing`
//!
//! A minimal subscriber that turns incoming [`Event`]s into `tracing` records.
//! Severity follows the event: anomalies and failures are `error`, subscriber
//! trouble and cancellations are `warn`, lifecycle noise is `info`/`debug`.
//!
//! ## Example output (with `tracing_subscriber::fmt`)
//! ```text
//! INFO  flavourvisor: runner-starting flavour=tokio
//! DEBUG flavourvisor: starting flavour=tokio payload="poller"
//! ERROR flavourvisor: failed flavour=tokio payload="poller" reason="connection refused"
//! ERROR flavourvisor: anomaly-detected flavour=tokio reason="..."
//! WARN  flavourvisor: cancelled flavour=local-pool payload="ticker"
//! INFO  flavourvisor: runner-aborted flavour=meta
//! ```

use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Subscribe for LogWriter {
    fn on_event(&self, e: &Event) {
        let label = e.kind.as_label();
        let flavour = e.flavour.map_or("meta", |f| f.as_label());
        let payload = e.payload.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");

        match e.kind {
            EventKind::PayloadFailed
            | EventKind::AnomalyDetected
            | EventKind::TeardownFailed
            | EventKind::SubscriberPanicked => {
                error!(seq = e.seq, "{label} flavour={flavour} payload={payload:?} reason={reason:?}");
            }
            EventKind::PayloadReturned
            | EventKind::PayloadCancelled
            | EventKind::SubscriberOverflow
            | EventKind::RunnerAborted => {
                warn!(seq = e.seq, "{label} flavour={flavour} payload={payload:?} reason={reason:?}");
            }
            EventKind::RunnerStarting | EventKind::RunnerStopped | EventKind::StopRequested => {
                info!(seq = e.seq, "{label} flavour={flavour}");
            }
            EventKind::PayloadRegistered
            | EventKind::PayloadStarting
            | EventKind::OneShotStarting
            | EventKind::OneShotFinished => {
                debug!(seq = e.seq, "{label} flavour={flavour} payload={payload:?}");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
