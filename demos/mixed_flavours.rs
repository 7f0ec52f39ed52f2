//! # Example: mixed_flavours
//!
//! Supervises payloads on all three backends at once and shows how the first
//! anomaly tears the whole group down.
//!
//! Demonstrates how to:
//! - Attach the built-in [`LogWriter`] through [`MetaRunner::builder`].
//! - Run one-shot payloads on a threaded and a cooperative flavour.
//! - Register endless payloads on every flavour.
//! - Inspect the [`Anomaly`] returned by `run`.
//!
//! ## Flow
//! ```text
//! run_payload("pick-port", Threaded) ──► 8080
//! run_payload("resolve", LocalPool)  ──► "127.0.0.1"
//!
//! register("heartbeat", Threaded)    loops forever
//! register("ticker", LocalPool)      parks forever
//! register("poller", Tokio)          fails after 3 polls
//!
//! run()
//!   ├─► PayloadFailed{ poller }
//!   ├─► AnomalyDetected ─► stop() every runner
//!   └─► Err(Anomaly{ flavour: tokio, payload: "poller", cause: UpstreamClosed })
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example mixed_flavours --features logging
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use flavourvisor::{
    Anomaly, Flavour, LogWriter, MetaRunner, Payload, PayloadResult, RunnerConfig, Subscribe,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
#[error("upstream closed after {polls} polls")]
struct UpstreamClosed {
    polls: u32,
}

async fn poller() -> PayloadResult {
    let mut polls = 0;
    loop {
        tokio::time::sleep(Duration::from_millis(100)).await;
        polls += 1;
        println!("[poller] poll #{polls}");
        if polls == 3 {
            return Err(UpstreamClosed { polls }.into());
        }
    }
}

async fn ticker() -> PayloadResult {
    // parked until the group is torn down
    futures::future::pending::<()>().await;
    Ok(())
}

fn report(anomaly: &Anomaly) {
    println!(
        "supervision aborted: flavour={} payload={} cause={}",
        anomaly.flavour(),
        anomaly.payload(),
        anomaly.cause()
    );
    if let Some(closed) = anomaly.cause().downcast_ref::<UpstreamClosed>() {
        println!("upstream gave up after {} polls", closed.polls);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let cfg = RunnerConfig {
        thread_prefix: "demo".into(),
        ..RunnerConfig::default()
    };
    let meta = MetaRunner::builder(cfg).with_subscribers(subs).build()?;

    let port = meta.run_payload(Payload::blocking("pick-port", || 8080), Flavour::Threaded)?;
    let host = meta.run_payload(
        Payload::cooperative("resolve", || async { "127.0.0.1" }),
        Flavour::LocalPool,
    )?;
    println!("serving on {host}:{port}");

    let done = Arc::new(AtomicBool::new(false));
    let heartbeat = {
        let done = done.clone();
        Payload::blocking("heartbeat", move || {
            while !done.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(50));
            }
            Ok(())
        })
    };
    meta.register(heartbeat, Flavour::Threaded)?;
    meta.register(Payload::cooperative("ticker", ticker), Flavour::LocalPool)?;
    meta.register(Payload::cooperative("poller", poller), Flavour::Tokio)?;

    match meta.run() {
        Ok(()) => println!("stopped without anomaly"),
        Err(err) => match err.anomaly() {
            Some(anomaly) => report(anomaly),
            None => return Err(err.into()),
        },
    }
    done.store(true, Ordering::Relaxed);
    Ok(())
}
